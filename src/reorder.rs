//! Reorder checklists by status.
//!
//! Each run of sibling checkbox lines is sorted in-progress, to-do, backlog,
//! waiting, done. Sort is stable, so lines keep their relative order within a
//! status. Indented lines under a task move with it. Blank lines between
//! siblings are dropped.

use crate::codec::{is_task_line, parse_line};
use crate::task::TaskStatus;

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::InProgress => 0,
        TaskStatus::NotStarted => 1,
        TaskStatus::Deferred => 2,
        TaskStatus::WaitingOnOthers => 3,
        TaskStatus::Completed => 4,
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|ch| ch.is_whitespace())
        .map(|ch| if ch == '\t' { 4 } else { 1 })
        .sum()
}

fn line_rank(line: &str) -> u8 {
    rank(parse_line(line, 0).map(|item| item.status).unwrap_or_default())
}

pub fn reorder_document(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        if !is_task_line(lines[i]) {
            out.push(lines[i]);
            i += 1;
            continue;
        }

        let indent = indent_width(lines[i]);
        let mut entries: Vec<(u8, Vec<&str>)> = Vec::new();
        loop {
            let mut block = vec![lines[i]];
            let status = line_rank(lines[i]);
            i += 1;
            while i < lines.len() && !lines[i].trim().is_empty() && indent_width(lines[i]) > indent
            {
                block.push(lines[i]);
                i += 1;
            }
            entries.push((status, block));

            let mut next = i;
            while next < lines.len() && lines[next].trim().is_empty() {
                next += 1;
            }
            if next < lines.len() && is_task_line(lines[next]) && indent_width(lines[next]) == indent {
                i = next;
                continue;
            }
            break;
        }

        entries.sort_by_key(|(status, _)| *status);
        out.extend(entries.into_iter().flat_map(|(_, block)| block));
    }

    let mut rendered = out.join("\n");
    if text.ends_with('\n') && !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_status_and_keeps_prose() {
        let text = "# Board\n\
                    - [x] done\n\
                    - [ ] todo\n\
                    - [!] waiting\n\
                    - [/] doing\n\
                    - [B] later\n\
                    \n\
                    Notes stay put.\n";
        assert_eq!(
            reorder_document(text),
            "# Board\n\
             - [/] doing\n\
             - [ ] todo\n\
             - [B] later\n\
             - [!] waiting\n\
             - [x] done\n\
             \n\
             Notes stay put.\n"
        );
    }

    #[test]
    fn children_travel_with_parent() {
        let text = "- [x] shipped\n    - note about shipping\n- [ ] next\n  - [ ] sub task\n";
        assert_eq!(
            reorder_document(text),
            "- [ ] next\n  - [ ] sub task\n- [x] shipped\n    - note about shipping\n"
        );
    }

    #[test]
    fn blank_lines_between_siblings_collapse() {
        let text = "- [x] a\n\n- [ ] b\n\n\n- [ ] c\n";
        assert_eq!(reorder_document(text), "- [ ] b\n- [ ] c\n- [x] a\n");
    }

    #[test]
    fn equal_status_keeps_order_and_tags() {
        let text = "- [ ] first [id:: 1]\n- [ ] second [priority:: high]\n";
        assert_eq!(reorder_document(text), text);
    }

    #[test]
    fn separate_lists_sort_independently() {
        let text = "- [x] a\n- [ ] b\nbreak\n- [x] c\n- [/] d";
        assert_eq!(reorder_document(text), "- [ ] b\n- [x] a\nbreak\n- [/] d\n- [x] c");
    }
}
