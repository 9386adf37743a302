//! Content schema model.
//!
//! [`SchemaModel`] is the graph the compiler walks. It is built from the
//! management API's content model ([`ContentModel`]); relation fields point at
//! other types by name, so cycles are representable and expected.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::document::ASSET_TYPENAME;

/// What a field selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value.
    Scalar,
    /// Rich text (`raw html markdown text`).
    RichText,
    /// Color (`hex css rgba`).
    Color,
    /// Geo location (`latitude longitude`).
    Location,
    /// Asset reference.
    Image,
    /// Reference to one type.
    Relation(String),
    /// Reference to one of several types.
    Polymorphic(Vec<String>),
}

/// One field of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// API id of the field.
    pub name: String,
    /// Selection kind.
    pub kind: FieldKind,
    /// Whether the field holds a list.
    pub is_list: bool,
}

impl FieldDescriptor {
    /// Single-valued field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_list: false,
        }
    }

    /// Mark as a list.
    #[must_use]
    pub const fn list(mut self) -> Self {
        self.is_list = true;
        self
    }
}

/// Resolved relation metadata for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    /// Candidate type names.
    pub targets: Vec<String>,
    /// More than one candidate type is allowed.
    pub polymorphic: bool,
    /// Whether the field holds a list.
    pub is_list: bool,
}

/// Whether a type is a top-level model or an embedded component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Queryable model with stages.
    Model,
    /// Embedded component.
    Component,
}

/// A content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// API id, also the GraphQL type name.
    pub name: String,
    /// Plural API id.
    pub plural: String,
    /// Model or component.
    pub kind: TypeKind,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    relations: IndexMap<String, RelationMeta>,
}

impl TypeDescriptor {
    /// Type without fields.
    pub fn new(name: impl Into<String>, plural: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            plural: plural.into(),
            kind,
            fields: Vec::new(),
            relations: IndexMap::new(),
        }
    }

    /// Append a field, recording relation metadata for relation kinds.
    #[must_use]
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.push_field(field);
        self
    }

    /// Append a field.
    pub fn push_field(&mut self, field: FieldDescriptor) {
        let meta = match &field.kind {
            FieldKind::Relation(target) => Some(RelationMeta {
                targets: vec![target.clone()],
                polymorphic: false,
                is_list: field.is_list,
            }),
            FieldKind::Polymorphic(targets) => Some(RelationMeta {
                targets: targets.clone(),
                polymorphic: true,
                is_list: field.is_list,
            }),
            _ => None,
        };
        if let Some(meta) = meta {
            self.relations.insert(field.name.clone(), meta);
        }
        self.fields.push(field);
    }

    /// Relation metadata for a field.
    pub fn relation(&self, field: &str) -> Option<&RelationMeta> {
        self.relations.get(field)
    }

    /// Field lookup by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Root field for a single document, e.g. `blogPost`.
    pub fn single_field(&self) -> String {
        lower_first(&self.name)
    }

    /// Root field for the paginated list, e.g. `blogPostsConnection`.
    pub fn connection_field(&self) -> String {
        format!("{}Connection", lower_first(&self.plural))
    }

    /// `true` for models.
    pub const fn is_model(&self) -> bool {
        matches!(self.kind, TypeKind::Model)
    }
}

pub(crate) fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

/// All known content types, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaModel {
    types: IndexMap<String, TypeDescriptor>,
}

impl SchemaModel {
    /// Empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a type.
    pub fn insert(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    /// Add a type, builder style.
    #[must_use]
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Look up a type.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values().filter(|descriptor| descriptor.is_model())
    }

    /// All types in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// `true` when no types are known.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Build from the management API content model. System models are
    /// skipped; assets are fetched through their own stream.
    #[must_use]
    pub fn from_content_model(model: ContentModel) -> Self {
        let mut schema = Self::new();
        for managed in model.models {
            if managed.is_system {
                debug!(model = %managed.api_id, "skipping system model");
                continue;
            }
            schema.insert(managed.into_descriptor(TypeKind::Model));
        }
        for managed in model.components {
            schema.insert(managed.into_descriptor(TypeKind::Component));
        }
        schema
    }
}

/// Content model as returned by the management API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentModel {
    /// Models.
    #[serde(default)]
    pub models: Vec<ManagedType>,
    /// Components.
    #[serde(default)]
    pub components: Vec<ManagedType>,
}

/// Model or component definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedType {
    api_id: String,
    api_id_plural: String,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    fields: Vec<ManagedField>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiIdRef {
    #[serde(rename = "apiId")]
    api_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UnionDef {
    #[serde(rename = "memberTypes", default)]
    member_types: Vec<UnionMember>,
}

#[derive(Debug, Clone, Deserialize)]
struct UnionMember {
    parent: ApiIdRef,
}

/// Field definition, discriminated by `__typename`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
enum ManagedField {
    SimpleField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        #[serde(rename = "type")]
        field_type: String,
    },
    EnumerableField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
    },
    RelationalField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        related_model: ApiIdRef,
    },
    UniDirectionalRelationalField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        related_model: ApiIdRef,
    },
    UnionField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        union: UnionDef,
    },
    ComponentField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        component: ApiIdRef,
    },
    ComponentUnionField {
        api_id: String,
        #[serde(default)]
        is_list: bool,
        #[serde(default)]
        components: Vec<ApiIdRef>,
    },
    #[serde(other)]
    Unsupported,
}

impl ManagedType {
    fn into_descriptor(self, kind: TypeKind) -> TypeDescriptor {
        let mut descriptor = TypeDescriptor::new(self.api_id, self.api_id_plural, kind);
        for field in self.fields {
            if let Some(field) = field.into_descriptor() {
                descriptor.push_field(field);
            }
        }
        descriptor
    }
}

impl ManagedField {
    fn into_descriptor(self) -> Option<FieldDescriptor> {
        let (name, is_list, kind) = match self {
            Self::SimpleField {
                api_id,
                is_list,
                field_type,
            } => {
                let kind = match field_type.as_str() {
                    "RICHTEXT" => FieldKind::RichText,
                    "COLOR" => FieldKind::Color,
                    "LOCATION" => FieldKind::Location,
                    _ => FieldKind::Scalar,
                };
                (api_id, is_list, kind)
            }
            Self::EnumerableField { api_id, is_list } => (api_id, is_list, FieldKind::Scalar),
            Self::RelationalField {
                api_id,
                is_list,
                related_model,
            }
            | Self::UniDirectionalRelationalField {
                api_id,
                is_list,
                related_model,
            } => {
                let kind = if related_model.api_id == ASSET_TYPENAME {
                    FieldKind::Image
                } else {
                    FieldKind::Relation(related_model.api_id)
                };
                (api_id, is_list, kind)
            }
            Self::UnionField {
                api_id,
                is_list,
                union,
            } => {
                let targets = union
                    .member_types
                    .into_iter()
                    .map(|member| member.parent.api_id)
                    .collect();
                (api_id, is_list, FieldKind::Polymorphic(targets))
            }
            Self::ComponentField {
                api_id,
                is_list,
                component,
            } => (api_id, is_list, FieldKind::Relation(component.api_id)),
            Self::ComponentUnionField {
                api_id,
                is_list,
                components,
            } => {
                let targets = components.into_iter().map(|c| c.api_id).collect();
                (api_id, is_list, FieldKind::Polymorphic(targets))
            }
            Self::Unsupported => return None,
        };
        Some(FieldDescriptor {
            name,
            kind,
            is_list,
        })
    }
}
