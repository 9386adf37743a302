//! Query AST to GraphQL document text.

use std::fmt::Write as _;

use crate::ast::{ArgValue, Arguments, Document, QueryNode, SelectionSet};

const INDENT: &str = "  ";

/// Render a document. Output follows insertion order and is stable for equal
/// inputs.
#[must_use]
pub fn serialize(document: &Document) -> String {
    let mut out = String::new();
    out.push_str(document.operation.keyword());
    if let Some(name) = &document.name {
        out.push(' ');
        out.push_str(name);
    }
    if !document.variables.is_empty() {
        out.push('(');
        for (index, (name, type_ref)) in document.variables.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "${name}: {type_ref}");
        }
        out.push(')');
    }
    out.push_str(" {\n");
    write_selection(&mut out, &document.selection, 1);
    out.push('}');
    out
}

fn write_selection(out: &mut String, selection: &SelectionSet, depth: usize) {
    for node in selection.iter() {
        write_node(out, node, depth);
    }
}

fn write_node(out: &mut String, node: &QueryNode, depth: usize) {
    let pad = INDENT.repeat(depth);
    match node {
        QueryNode::Leaf(leaf) => {
            out.push_str(&pad);
            if let Some(alias) = &leaf.alias {
                out.push_str(alias);
                out.push_str(": ");
            }
            out.push_str(&leaf.name);
            out.push('\n');
        }
        QueryNode::Object(object) => {
            out.push_str(&pad);
            if let Some(alias) = &object.alias {
                out.push_str(alias);
                out.push_str(": ");
            }
            out.push_str(&object.name);
            write_arguments(out, &object.arguments);
            if object.children.is_empty() {
                out.push('\n');
            } else {
                out.push_str(" {\n");
                write_selection(out, &object.children, depth + 1);
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
        QueryNode::Conditional(group) => {
            for (type_name, selection) in &group.branches {
                out.push_str(&pad);
                out.push_str("... on ");
                out.push_str(type_name);
                out.push_str(" {\n");
                write_selection(out, selection, depth + 1);
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
    }
}

fn write_arguments(out: &mut String, arguments: &Arguments) {
    if arguments.is_empty() {
        return;
    }
    out.push('(');
    for (index, (name, value)) in arguments.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push_str(": ");
        write_value(out, value);
    }
    out.push(')');
}

/// Render a single argument literal.
pub fn write_value(out: &mut String, value: &ArgValue) {
    match value {
        ArgValue::Null => out.push_str("null"),
        ArgValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ArgValue::Int(n) => {
            let _ = write!(out, "{n}");
        }
        ArgValue::Float(f) if f.is_finite() => {
            let _ = write!(out, "{f:?}");
        }
        ArgValue::Float(_) => out.push_str("null"),
        ArgValue::String(s) => write_string(out, s),
        ArgValue::Enum(raw) => out.push_str(raw),
        ArgValue::Variable(name) => {
            out.push('$');
            out.push_str(name);
        }
        ArgValue::List(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        ArgValue::Object(entries) if entries.is_empty() => out.push_str("{}"),
        ArgValue::Object(entries) => {
            out.push_str("{ ");
            for (index, (key, item)) in entries.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push_str(" }");
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
