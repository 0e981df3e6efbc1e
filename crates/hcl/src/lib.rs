use std::io::Write;
use tfimport_core::{EngineError, Field, FullDumpResource, ResourceData, ResourceDefinition, Scalar};

pub const INDENT: &str = "\t";

/// Renders `data` as block-syntax lines indented `depth` levels.
///
/// Absent fields produce no output. A single blank line separates the
/// scalar attributes from the first nested block when both are present.
pub fn encode(data: &ResourceData, depth: usize) -> Vec<u8> {
    let mut out = String::new();
    encode_into(&mut out, data, depth);
    out.into_bytes()
}

fn encode_into(out: &mut String, data: &ResourceData, depth: usize) {
    let indent = INDENT.repeat(depth);
    let mut scalars = 0usize;
    let mut in_blocks = false;
    for (key, field) in data.fields() {
        let blocks: &[ResourceData] = match field {
            Field::Scalar(None) | Field::Block(None) => continue,
            Field::Scalar(Some(v)) => {
                out.push_str(&indent);
                out.push_str(key);
                out.push_str(" = ");
                push_scalar(out, v);
                out.push('\n');
                scalars += 1;
                continue;
            }
            Field::Block(Some(block)) => std::slice::from_ref(block),
            Field::Blocks(blocks) => blocks,
        };
        for block in blocks {
            if !in_blocks {
                if scalars > 0 { out.push('\n'); }
                in_blocks = true;
            }
            out.push_str(&format!("{indent}{key} {{\n"));
            encode_into(out, block, depth + 1);
            out.push_str(&format!("{indent}}}\n"));
        }
    }
}

fn push_scalar(out: &mut String, v: &Scalar) {
    match v {
        Scalar::String(s) => push_quoted(out, s),
        Scalar::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Scalar::Number(n) => out.push_str(&n.to_string()),
    }
}

// Quoted template: escapes plus `${`/`%{` doubled so imported text stays literal.
fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            '$' | '%' if chars.peek() == Some(&'{') => { out.push(c); out.push(c); }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Fills `def.content` with the body placed between the braces on merge.
pub fn render_body(def: &mut ResourceDefinition, data: &ResourceData) {
    let body = encode(data, 1);
    def.content = if body.is_empty() {
        Vec::new()
    } else {
        let mut content = Vec::with_capacity(body.len() + 1);
        content.push(b'\n');
        content.extend_from_slice(&body);
        content
    };
}

/// Bare provider alias from a state `provider` attribute.
///
/// Handles `provider.onelogin`, `provider.aws.west`,
/// `provider["registry.terraform.io/hashicorp/aws"]` and its `.alias` form.
pub fn provider_alias(attr: &str) -> &str {
    if let Some((_, alias)) = attr.rsplit_once("\"].") { return alias; }
    if let Some(source) = attr.strip_prefix("provider[\"").and_then(|s| s.strip_suffix("\"]")) {
        return source.rsplit_once('/').map_or(source, |(_, name)| name);
    }
    attr.rsplit_once('.').map_or(attr, |(_, name)| name)
}

pub fn provider_block(alias: &str) -> String {
    format!("provider {alias} {{\n\talias = \"{alias}\"\n}}\n\n")
}

/// Complete configuration for a resource collection: a provider block per
/// distinct alias in first-seen order, then one resource block per resource.
pub fn render_full_state(resources: &[FullDumpResource]) -> Vec<u8> {
    let mut aliases: Vec<&str> = Vec::new();
    for r in resources {
        let alias = provider_alias(&r.provider);
        if !aliases.contains(&alias) { aliases.push(alias); }
    }

    let mut out = String::new();
    for alias in &aliases { out.push_str(&provider_block(alias)); }
    for r in resources {
        out.push_str(&format!("resource {} {} {{\n", r.type_name, r.name));
        out.push_str(&format!("{INDENT}provider = {}\n", provider_alias(&r.provider)));
        encode_into(&mut out, &r.data, 1);
        out.push_str("}\n\n");
    }
    tracing::debug!(providers = aliases.len(), resources = resources.len(), "rendered full state");
    out.into_bytes()
}

pub fn write_full_state<W: Write>(w: &mut W, resources: &[FullDumpResource]) -> Result<(), EngineError> {
    w.write_all(&render_full_state(resources)).map_err(EngineError::Write)?;
    w.flush().map_err(EngineError::Write)
}
