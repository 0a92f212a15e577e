//! YAML document boundary detection

/// Byte and line span of one document within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub line_count: usize,
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    match line.strip_prefix("---") {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t']),
        None => false,
    }
}

/// Split `content` on `---` separator lines.
///
/// The separator lines themselves belong to no document. A blank chunk before the first
/// separator is not counted as a document; every later chunk is, even when empty, so
/// document indexes stay stable while a user types inside one of them.
pub fn split_documents(content: &str) -> Vec<DocumentSpan> {
    fn push(
        spans: &mut Vec<DocumentSpan>,
        content: &str,
        (start, end): (usize, usize),
        (start_line, end_line): (usize, usize),
        leading: bool,
    ) {
        if leading && content[start..end].trim().is_empty() {
            return;
        }
        spans.push(DocumentSpan {
            index: spans.len(),
            start,
            end,
            start_line,
            line_count: end_line - start_line,
        });
    }

    let mut spans = Vec::new();
    let mut doc_start = 0usize;
    let mut doc_start_line = 0usize;
    let mut offset = 0usize;
    let mut line_no = 0usize;
    let mut seen_separator = false;

    for line in content.split_inclusive('\n') {
        if is_separator(line) {
            push(
                &mut spans,
                content,
                (doc_start, offset),
                (doc_start_line, line_no),
                !seen_separator,
            );
            seen_separator = true;
            doc_start = offset + line.len();
            doc_start_line = line_no + 1;
        }
        offset += line.len();
        line_no += 1;
    }
    push(
        &mut spans,
        content,
        (doc_start, content.len()),
        (doc_start_line, line_no),
        !seen_separator,
    );
    spans
}
