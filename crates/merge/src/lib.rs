//! Best-effort, append-only merge of generated declarations into an
//! existing configuration file.
//!
//! Existing declarations are found with a line tokenizer rather than a
//! parser: a line whose first token is `resource` or `provider` counts as a
//! declaration header, every other line is ignored. Headers that appear
//! twice are counted twice, including in files that are not valid syntax.

use std::io::{BufRead, BufReader, Read, Write};
use tfimport_core::{DefinitionCounts, EngineError, ResourceDefinition};
use tfimport_hcl::provider_block;

// Accepts `name`, `"name"` and a `{` glued to the label.
fn label(token: &str) -> &str { token.trim_end_matches('{').trim_matches('"') }

/// Counts resource addresses and provider names declared in `existing`,
/// reading it once from the current position to the end.
pub fn scan<R: Read>(existing: R) -> Result<DefinitionCounts, EngineError> {
    scan_tail(existing).map(|(counts, _)| counts)
}

// Also reports whether the input is non-empty and its last line lacks `\n`.
// Bytes that are not UTF-8 are replaced, never rejected.
fn scan_tail<R: Read>(existing: R) -> Result<(DefinitionCounts, bool), EngineError> {
    let mut reader = BufReader::new(existing);
    let mut counts = DefinitionCounts::default();
    let mut line = Vec::new();
    let mut unterminated = false;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(EngineError::Read)? == 0 { break; }
        unterminated = line.last() != Some(&b'\n');
        count_line(&mut counts, &String::from_utf8_lossy(&line));
    }
    Ok((counts, unterminated))
}

fn count_line(counts: &mut DefinitionCounts, line: &str) {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("resource") => {
            if let (Some(t), Some(n)) = (tokens.next(), tokens.next()) {
                let address = format!("{}.{}", label(t), label(n));
                tracing::debug!(%address, "found resource");
                counts.record_resource(address);
            }
        }
        Some("provider") => {
            if let Some(p) = tokens.next() {
                tracing::debug!(provider = label(p), "found provider");
                counts.record_provider(label(p));
            }
        }
        _ => {}
    }
}

/// Splits `candidates` into the definitions not yet declared and the
/// providers those definitions need that are not yet declared, both in
/// first-seen order.
pub fn filter(counts: &DefinitionCounts, candidates: Vec<ResourceDefinition>) -> (Vec<ResourceDefinition>, Vec<String>) {
    let mut definitions = Vec::new();
    for def in candidates {
        let address = def.address();
        if counts.resource_count(&address) == 0 {
            definitions.push(def);
        } else {
            tracing::debug!(%address, "already declared");
        }
    }

    let mut providers: Vec<String> = Vec::new();
    for def in &definitions {
        let key = def.provider_key();
        if !providers.iter().any(|p| p == key) { providers.push(key.to_string()); }
    }
    providers.retain(|p| counts.provider_count(p) == 0);
    (definitions, providers)
}

/// What `append_new` wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub providers: Vec<String>,
    pub resources: Vec<ResourceDefinition>,
}

impl AppendSummary {
    pub fn is_empty(&self) -> bool { self.providers.is_empty() && self.resources.is_empty() }
}

/// Compact rendering used for appends: provider blocks, then one line per
/// resource with its content inserted verbatim between the braces.
pub fn render_append(definitions: &[ResourceDefinition], providers: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in providers { out.extend_from_slice(provider_block(p).as_bytes()); }
    for def in definitions {
        out.extend_from_slice(format!("resource {} {} {{", def.type_name, def.name).as_bytes());
        out.extend_from_slice(&def.content);
        out.extend_from_slice(b"}\n");
    }
    out
}

/// Scans `stream`, then appends provider and resource blocks for everything
/// in `candidates` not already declared. Nothing is written if the scan
/// fails. The write is not atomic.
pub fn append_new<S: Read + Write>(stream: &mut S, candidates: Vec<ResourceDefinition>) -> Result<AppendSummary, EngineError> {
    let (counts, unterminated) = scan_tail(&mut *stream)?;
    let (resources, providers) = filter(&counts, candidates);
    if !resources.is_empty() {
        if unterminated { stream.write_all(b"\n").map_err(EngineError::Write)?; }
        stream.write_all(&render_append(&resources, &providers)).map_err(EngineError::Write)?;
        stream.flush().map_err(EngineError::Write)?;
    }
    tracing::info!(providers = providers.len(), resources = resources.len(), "appended new definitions");
    Ok(AppendSummary { providers, resources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn def(provider: &str, name: &str, type_name: &str) -> ResourceDefinition {
        ResourceDefinition::new(provider, type_name, name)
    }

    #[test]
    fn scan_counts_repeated_headers_twice() {
        let text = r#"
            provider onelogin {
                alias = "onelogin"
            }
            resource onelogin_apps test {
                name = "should not be here"
            }
            resource onelogin_apps test {
                name = "this is not proper HCL and will get counted again"
            }
        "#;
        let counts = scan(text.as_bytes()).unwrap();
        assert_eq!(counts.resource_count("onelogin_apps.test"), 2);
        assert_eq!(counts.provider_count("onelogin"), 1);
        assert_eq!(counts.resources().len(), 1);
        assert_eq!(counts.providers().len(), 1);
    }

    #[test]
    fn scan_accepts_quoted_labels_and_ignores_short_lines() {
        let text = "resource \"aws_s3_bucket\" \"logs\" {\n}\nresource lonely\nprovider\nprovider \"aws\"{\n  resource_type = 1\n}\n";
        let counts = scan(text.as_bytes()).unwrap();
        assert_eq!(counts.resource_count("aws_s3_bucket.logs"), 1);
        assert_eq!(counts.resources().len(), 1);
        assert_eq!(counts.provider_count("aws"), 1);
    }

    #[test]
    fn scan_propagates_io_errors() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> { Err(std::io::ErrorKind::ConnectionReset.into()) }
        }
        assert!(matches!(scan(Failing), Err(EngineError::Read(_))));
    }

    #[test]
    fn scan_tolerates_invalid_utf8() {
        let counts = scan(&b"# caf\xe9 settings\nresource onelogin_apps portal {}\nprovider onelogin\xff {\n"[..]).unwrap();
        assert_eq!(counts.resource_count("onelogin_apps.portal"), 1);
        assert_eq!(counts.providers().len(), 1);
    }

    #[test]
    fn append_starts_on_a_new_line_after_unterminated_file() {
        let mut file = Cursor::new(b"resource t a {}".to_vec());
        let first = append_new(&mut file, vec![def("p", "b", "t")]).unwrap();
        assert_eq!(first.providers, vec!["p"]);
        file.set_position(0);
        let second = append_new(&mut file, vec![def("p", "c", "t")]).unwrap();
        assert!(second.providers.is_empty());
        assert_eq!(
            String::from_utf8(file.into_inner()).unwrap(),
            "resource t a {}\nprovider p {\n\talias = \"p\"\n}\n\nresource t b {}\nresource t c {}\n"
        );
    }

    #[test]
    fn filter_keeps_undeclared_resources_and_providers() {
        let mut counts = DefinitionCounts::default();
        counts.record_resource("onelogin_apps.defined_in_main_already");
        counts.record_provider("onelogin");
        let candidates = vec![
            def("onelogin", "defined_in_main_already", "onelogin_apps"),
            def("onelogin", "new_resource", "onelogin_apps"),
            def("onelogin", "test", "onelogin_saml_apps"),
            def("okra", "test", "okra_saml_apps"),
            def("aws", "test", "aws_apps"),
        ];
        let (definitions, providers) = filter(&counts, candidates);
        assert_eq!(
            definitions,
            vec![
                def("onelogin", "new_resource", "onelogin_apps"),
                def("onelogin", "test", "onelogin_saml_apps"),
                def("okra", "test", "okra_saml_apps"),
                def("aws", "test", "aws_apps"),
            ]
        );
        assert_eq!(providers, vec!["okra", "aws"]);
    }

    #[test]
    fn filter_drops_providers_only_used_by_duplicates() {
        let mut counts = DefinitionCounts::default();
        counts.record_resource("okra_apps.a");
        let (definitions, providers) = filter(&counts, vec![def("okra", "a", "okra_apps"), def("aws", "b", "aws_apps"), def("aws", "c", "aws_apps")]);
        assert_eq!(definitions.len(), 2);
        assert_eq!(providers, vec!["aws"]);
    }

    #[test]
    fn filter_dedups_by_address_only() {
        let mut counts = DefinitionCounts::default();
        counts.record_resource("apps.x");
        let (definitions, _) = filter(&counts, vec![def("other", "x", "apps").with_import_id("99")]);
        assert!(definitions.is_empty());
    }

    #[test]
    fn append_writes_compact_blocks() {
        let mut file = Cursor::new(Vec::new());
        let summary = append_new(&mut file, vec![def("test", "test", "test"), def("test2", "test", "test")]).unwrap();
        assert_eq!(
            String::from_utf8(file.into_inner()).unwrap(),
            "provider test {\n\talias = \"test\"\n}\n\nprovider test2 {\n\talias = \"test2\"\n}\n\nresource test test {}\nresource test test {}\n"
        );
        assert_eq!(summary.providers, vec!["test", "test2"]);
        assert_eq!(summary.resources.len(), 2);
    }

    #[test]
    fn content_is_inserted_verbatim() {
        let mut with_newline = def("p", "a", "t");
        with_newline.content = b"\n\tname = \"a\"\n".to_vec();
        let mut without = def("p", "b", "t");
        without.content = b" name = \"b\" ".to_vec();
        let out = render_append(&[with_newline, without], &[]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "resource t a {\n\tname = \"a\"\n}\nresource t b { name = \"b\" }\n"
        );
    }

    #[test]
    fn append_after_existing_content() {
        let existing = "provider p {\n\talias = \"p\"\n}\n\nresource t a {}\n";
        let mut file = Cursor::new(existing.as_bytes().to_vec());
        let summary = append_new(&mut file, vec![def("p", "a", "t"), def("p", "b", "t")]).unwrap();
        assert!(summary.providers.is_empty());
        assert_eq!(String::from_utf8(file.into_inner()).unwrap(), format!("{existing}resource t b {{}}\n"));
    }

    #[test]
    fn append_with_nothing_new_leaves_stream_untouched() {
        let existing = "resource t a {}\n";
        let mut file = Cursor::new(existing.as_bytes().to_vec());
        let summary = append_new(&mut file, vec![def("p", "a", "t")]).unwrap();
        assert!(summary.is_empty());
        assert_eq!(file.into_inner(), existing.as_bytes());
    }

    #[test]
    fn append_does_not_write_when_scan_fails() {
        struct Unreadable { written: Vec<u8> }
        impl Read for Unreadable {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> { Err(std::io::ErrorKind::PermissionDenied.into()) }
        }
        impl Write for Unreadable {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> { self.written.extend_from_slice(buf); Ok(buf.len()) }
            fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
        }
        let mut file = Unreadable { written: Vec::new() };
        let res = append_new(&mut file, vec![def("p", "a", "t")]);
        assert!(matches!(res, Err(EngineError::Read(_))));
        assert!(file.written.is_empty());
    }
}
