//! File-content context around a changed line.
//!
//! Indices are 1-based and inclusive to match editor displays and diff
//! anchors.

pub mod imports;

/// A window of file text around a target line, plus the imports scanned from
/// the file's prefix.
#[derive(Debug, Clone)]
pub struct FileContext {
    /// The window's lines, top to bottom.
    pub lines: Vec<String>,
    /// 1-based inclusive bounds; `start <= target <= end` and
    /// `lines.len() == end - start + 1`.
    pub start_line: u32,
    pub target_line: u32,
    pub end_line: u32,
    pub total_lines: u32,
    pub imports: Vec<String>,
}

/// Builds a context window of `radius` lines on either side of
/// `target_line`, clamped to the file bounds.
pub fn build_file_context(
    content: &str,
    language: &str,
    target_line: u32,
    radius: u32,
) -> FileContext {
    let all: Vec<&str> = content.lines().collect();
    let total_lines = all.len() as u32;
    let target_line = target_line.clamp(1, total_lines.max(1));

    let start_line = target_line.saturating_sub(radius).max(1);
    let end_line = (target_line + radius).min(total_lines.max(1));

    let lines = all
        .iter()
        .skip(start_line as usize - 1)
        .take((end_line - start_line + 1) as usize)
        .map(|s| s.to_string())
        .collect();

    FileContext {
        lines,
        start_line,
        target_line,
        end_line,
        total_lines,
        imports: imports::extract_imports(content, language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn window_is_inclusive_and_clamped() {
        let ctx = build_file_context(&numbered(30), "unknown", 15, 5);
        assert_eq!(ctx.start_line, 10);
        assert_eq!(ctx.end_line, 20);
        assert_eq!(ctx.lines.len(), 11);
        assert_eq!(ctx.lines[0], "line 10");
        assert_eq!(ctx.lines[10], "line 20");
        assert_eq!(ctx.total_lines, 30);
    }

    #[test]
    fn window_clamps_at_file_start_and_end() {
        let ctx = build_file_context(&numbered(10), "unknown", 2, 5);
        assert_eq!(ctx.start_line, 1);
        assert_eq!(ctx.end_line, 7);
        assert_eq!(ctx.lines.len(), 7);

        let ctx = build_file_context(&numbered(10), "unknown", 9, 5);
        assert_eq!(ctx.start_line, 4);
        assert_eq!(ctx.end_line, 10);
    }

    #[test]
    fn target_beyond_eof_is_clamped_to_last_line() {
        let ctx = build_file_context(&numbered(5), "unknown", 50, 2);
        assert_eq!(ctx.target_line, 5);
        assert_eq!(ctx.end_line, 5);
    }
}
