use std::sync::{Arc, OnceLock};

use lsp_types::Url;

use crate::analyzer::AnalyzedDocument;
use crate::syntax::{Parser, Position, SyntaxTree};

const SAMPLE_SOURCE: &str = include_str!("../tests/fixtures/sample.bb");
const SAMPLE_URI: &str = "file:///layers/meta-sample/recipes-example/hello/hello_1.0.bb";

struct SampleFixture {
    uri: Url,
    document: Arc<AnalyzedDocument>,
}

static SAMPLE_FIXTURE: OnceLock<SampleFixture> = OnceLock::new();

fn sample_fixture() -> &'static SampleFixture {
    SAMPLE_FIXTURE.get_or_init(|| {
        let uri = Url::parse(SAMPLE_URI).expect("sample uri");
        let tree = Parser::new()
            .parse(SAMPLE_SOURCE)
            .expect("failed to parse sample recipe fixture");
        let document = Arc::new(AnalyzedDocument::new(uri.clone(), tree));
        SampleFixture { uri, document }
    })
}

pub fn sample_source() -> &'static str {
    SAMPLE_SOURCE
}

pub fn sample_uri() -> Url {
    sample_fixture().uri.clone()
}

pub fn sample_document() -> Arc<AnalyzedDocument> {
    sample_fixture().document.clone()
}

pub fn sample_tree() -> &'static SyntaxTree {
    sample_fixture().document.tree()
}

/// Position of the first occurrence of `needle`, offset by `column_offset`
/// bytes.
pub fn position_of(source: &str, needle: &str, column_offset: usize) -> Position {
    let offset = source
        .find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in source"));
    let line = source[..offset].matches('\n').count();
    let line_start = source[..offset].rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    Position::new(line, offset - line_start + column_offset)
}
