use crate::{LinkRef, RefKind, TaskItem};

#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedNote {
    pub links: Vec<LinkRef>,
    pub tasks: Vec<TaskItem>,
}

/// Extract link references and task-list items from raw note text.
///
/// One left-to-right pass, line by line, with no backtracking. The same
/// scan produces both the render-time task ordinals and the byte offsets
/// the mutation engine rewrites, so the two can never disagree.
pub(crate) fn parse_note(content: &str) -> ParsedNote {
    let mut out = ParsedNote::default();
    let mut wiki_ordinal = 0usize;
    let mut in_fenced = false;
    let mut line_start = 0usize;

    for (line_ix, raw_line) in content.split_inclusive('\n').enumerate() {
        let line = raw_line.trim_end_matches(['\r', '\n']);
        let line_no = (line_ix + 1) as u32;

        if is_fence(line) {
            in_fenced = !in_fenced;
            line_start += raw_line.len();
            continue;
        }
        if in_fenced {
            line_start += raw_line.len();
            continue;
        }

        extract_wiki_refs(line, &mut wiki_ordinal, &mut out.links);
        extract_path_refs(line, &mut out.links);

        if let Some((status_col, checked, text)) = parse_task_line(line) {
            out.tasks.push(TaskItem {
                line: line_no,
                checked,
                marker_offset: line_start + status_col,
                text: text.to_string(),
            });
        }

        line_start += raw_line.len();
    }

    out
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// A task line is a list-item marker immediately followed by a checkbox
/// marker at the start of the item's text. Checkbox-like sequences anywhere
/// else are left alone.
fn parse_task_line(line: &str) -> Option<(usize, bool, &str)> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();
    let mut rest = trimmed;

    if let Some(r) = rest
        .strip_prefix("- ")
        .or_else(|| rest.strip_prefix("* "))
        .or_else(|| rest.strip_prefix("+ "))
    {
        rest = r;
    } else {
        // Ordered list: "1. " or "1) "
        let bytes = rest.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == 0 || i + 1 >= bytes.len() {
            return None;
        }
        if bytes[i] != b'.' && bytes[i] != b')' {
            return None;
        }
        if bytes[i + 1] != b' ' {
            return None;
        }
        rest = &rest[i + 2..];
    }

    let bytes = rest.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'[' || bytes[2] != b']' {
        return None;
    }
    if bytes.len() > 3 && bytes[3] != b' ' {
        return None;
    }
    let checked = match bytes[1] {
        b' ' => false,
        b'x' | b'X' => true,
        _ => return None,
    };

    let status_col = indent + (trimmed.len() - rest.len()) + 1;
    let text = rest[3..].trim();
    Some((status_col, checked, text))
}

fn extract_wiki_refs(line: &str, ordinal: &mut usize, out: &mut Vec<LinkRef>) {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] != b'[' || bytes[i + 1] != b'[' {
            i += 1;
            continue;
        }
        let mut j = i + 2;
        let mut closed = false;
        while j + 1 < bytes.len() {
            if bytes[j] == b']' && bytes[j + 1] == b']' {
                closed = true;
                break;
            }
            j += 1;
        }
        if !closed {
            break;
        }

        if let Some((target, display)) = split_wiki_ref(&line[i + 2..j]) {
            out.push(LinkRef {
                target,
                kind: RefKind::Wiki { ordinal: *ordinal },
                display,
            });
            *ordinal += 1;
        }
        i = j + 2;
    }
}

fn split_wiki_ref(inner: &str) -> Option<(String, Option<String>)> {
    let s = inner.trim();
    if s.is_empty() {
        return None;
    }

    let (before_display, display) = match s.split_once('|') {
        Some((left, right)) => (
            left.trim(),
            Some(right.trim().to_string()).filter(|d| !d.is_empty()),
        ),
        None => (s, None),
    };

    // A heading fragment does not affect resolution.
    let target = match before_display.split_once('#') {
        Some((left, _)) => left.trim(),
        None => before_display,
    };
    if target.is_empty() {
        return None;
    }

    Some((target.to_string(), display))
}

fn extract_path_refs(line: &str, out: &mut Vec<LinkRef>) {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        // `[[..]]` is handled by the wiki scanner.
        if i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            i += 2;
            continue;
        }

        let mut j = i + 1;
        while j < bytes.len() && bytes[j] != b']' {
            j += 1;
        }
        if j >= bytes.len() || j + 1 >= bytes.len() || bytes[j + 1] != b'(' {
            i += 1;
            continue;
        }
        let display = &line[i + 1..j];

        let mut k = j + 2;
        while k < bytes.len() && bytes[k] != b')' {
            k += 1;
        }
        if k >= bytes.len() {
            break;
        }

        if let Some(target) = candidate_note_target(&line[j + 2..k]) {
            out.push(LinkRef {
                target,
                kind: RefKind::Path,
                display: Some(display.trim().to_string()).filter(|d| !d.is_empty()),
            });
        }
        i = k + 1;
    }
}

/// Only targets that look like relative paths are candidate note links;
/// URLs, mailto links, in-page anchors and absolute paths are not.
fn candidate_note_target(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.starts_with('/') || s.starts_with('#') {
        return None;
    }
    if s.contains("://") || s.starts_with("mailto:") {
        return None;
    }

    let target = match s.split_once('#') {
        Some((left, _)) => left.trim(),
        None => s,
    };
    if target.is_empty() {
        return None;
    }
    Some(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiki_refs_keep_document_order_and_ordinals() {
        let note = parse_note("See [[B]] and [[C|see c]].\nAlso [[D#Section]].\n");
        let targets: Vec<_> = note.links.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["B", "C", "D"]);
        assert_eq!(note.links[0].kind, RefKind::Wiki { ordinal: 0 });
        assert_eq!(note.links[1].kind, RefKind::Wiki { ordinal: 1 });
        assert_eq!(note.links[1].display.as_deref(), Some("see c"));
        assert_eq!(note.links[2].kind, RefKind::Wiki { ordinal: 2 });
    }

    #[test]
    fn path_refs_skip_urls_and_anchors() {
        let note = parse_note(
            "[a](sub/other.md) [b](https://example.com) [c](#heading) [d](mailto:x@y) [e](/abs)\n",
        );
        assert_eq!(note.links.len(), 1);
        assert_eq!(note.links[0].target, "sub/other.md");
        assert_eq!(note.links[0].kind, RefKind::Path);
    }

    #[test]
    fn path_ref_drops_heading_fragment() {
        let note = parse_note("[a](other.md#section)\n");
        assert_eq!(note.links[0].target, "other.md");
    }

    #[test]
    fn tasks_record_marker_offsets() {
        let content = "- [ ] one\n- [x] two\n";
        let note = parse_note(content);
        assert_eq!(note.tasks.len(), 2);

        assert!(!note.tasks[0].checked);
        assert_eq!(content.as_bytes()[note.tasks[0].marker_offset], b' ');
        assert!(note.tasks[1].checked);
        assert_eq!(content.as_bytes()[note.tasks[1].marker_offset], b'x');
        assert_eq!(note.tasks[1].line, 2);
        assert_eq!(note.tasks[1].text, "two");
    }

    #[test]
    fn checkbox_sequences_outside_item_start_are_not_tasks() {
        let note = parse_note("some [x] inline\n- text then [ ] later\n-[ ] no space\n");
        assert!(note.tasks.is_empty());
    }

    #[test]
    fn ordered_list_tasks_are_recognized() {
        let note = parse_note("1. [ ] first\n2) [X] second\n");
        assert_eq!(note.tasks.len(), 2);
        assert!(note.tasks[1].checked);
    }

    #[test]
    fn fenced_code_blocks_are_skipped_by_both_extractions() {
        let content = "```\n- [ ] not a task\n[[notalink]]\n```\n- [ ] real\n[[link]]\n";
        let note = parse_note(content);
        assert_eq!(note.tasks.len(), 1);
        assert_eq!(note.tasks[0].text, "real");
        assert_eq!(note.links.len(), 1);
        assert_eq!(note.links[0].target, "link");
    }

    #[test]
    fn indented_and_crlf_tasks_keep_correct_offsets() {
        let content = "intro\r\n  - [ ] indented\r\n";
        let note = parse_note(content);
        assert_eq!(note.tasks.len(), 1);
        assert_eq!(content.as_bytes()[note.tasks[0].marker_offset], b' ');
        // The byte before the marker is '[' and after is ']'.
        assert_eq!(content.as_bytes()[note.tasks[0].marker_offset - 1], b'[');
        assert_eq!(content.as_bytes()[note.tasks[0].marker_offset + 1], b']');
    }
}
