//! Structural boundary discovery for the splitter.
//!
//! Artifacts are parsed into ordered sections at their own nesting markers
//! (top-level headings), with sub-headings and then paragraphs as the
//! finer boundaries used when a single section exceeds the budget.

use crate::util::slugify;

/// One structural section of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The heading text, absent for preamble or paragraph fragments.
    pub heading: Option<String>,
    /// The heading's anchor slug, when a heading is present.
    pub anchor: Option<String>,
    /// Heading level: 0 for preamble/fragments, 1 for `#`, 2 for `##`, ...
    pub level: u8,
    /// The exact lines of the section, heading line included.
    pub lines: Vec<String>,
}

impl Section {
    fn from_lines(lines: Vec<String>) -> Self {
        let (heading, level) = lines
            .first()
            .and_then(|l| heading_level(l))
            .map_or((None, 0), |(level, text)| (Some(text.to_string()), level));
        let anchor = heading.as_deref().map(slugify);
        Self {
            heading,
            anchor,
            level,
            lines,
        }
    }

    /// Returns the section size in lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the section content with its line structure intact.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Parses content into its ordered top-level sections.
///
/// Lines before the first top-level heading form a level-0 preamble
/// section. The sections partition the content with no gaps or overlaps.
#[must_use]
pub fn parse_sections(content: &str) -> Vec<Section> {
    split_at_level(content.lines().map(str::to_string).collect(), 1)
}

/// Splits a section at the next finer boundary until every piece fits the
/// budget. Falls back from sub-headings to paragraphs to raw line chunks;
/// content is never truncated.
#[must_use]
pub fn atomize(section: Section, budget: usize) -> Vec<Section> {
    if section.line_count() <= budget {
        return vec![section];
    }

    // Finest heading level present strictly below the section's own.
    let finer_level = section
        .lines
        .iter()
        .skip(usize::from(section.level > 0))
        .filter_map(|l| heading_level(l).map(|(level, _)| level))
        .filter(|&level| level > section.level)
        .min();

    let pieces = match finer_level {
        // Paragraph pieces are already bounded by the budget.
        None => return split_at_paragraphs(section.lines, budget),
        Some(level) => split_at_level(section.lines, level),
    };

    if pieces.len() == 1 {
        // The only finer heading opens the section; paragraphs are the
        // next usable boundary.
        if let Some(only) = pieces.into_iter().next() {
            return split_at_paragraphs(only.lines, budget);
        }
        return Vec::new();
    }

    pieces
        .into_iter()
        .flat_map(|piece| atomize(piece, budget))
        .collect()
}

/// Returns the anchor slugs of every heading in the content, in order.
#[must_use]
pub fn anchors_in(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|l| heading_level(l).map(|(_, text)| slugify(text)))
        .collect()
}

/// Parses a heading line into its level and text.
fn heading_level(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.strip_prefix(' ')
        .map(|text| (hashes as u8, text.trim()))
}

fn split_at_level(lines: Vec<String>, level: u8) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in lines {
        let starts_section = heading_level(&line).is_some_and(|(l, _)| l == level);
        if starts_section && !current.is_empty() {
            sections.push(Section::from_lines(std::mem::take(&mut current)));
        }
        current.push(line);
    }
    if !current.is_empty() {
        sections.push(Section::from_lines(current));
    }
    sections
}

fn split_at_paragraphs(lines: Vec<String>, budget: usize) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut in_blank_run = false;

    for line in lines {
        let blank = line.trim().is_empty();
        // A paragraph starts at the first non-blank line after a blank run.
        if !blank && in_blank_run && !current.is_empty() {
            sections.push(Section::from_lines(std::mem::take(&mut current)));
        }
        in_blank_run = blank;
        current.push(line);

        // A paragraph with no internal blanks can still exceed the budget.
        if current.len() >= budget {
            sections.push(Section::from_lines(std::mem::take(&mut current)));
            in_blank_run = false;
        }
    }
    if !current.is_empty() {
        sections.push(Section::from_lines(current));
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(n: usize) -> String {
        (0..n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_parse_sections_at_top_level() {
        let content = format!(
            "preamble\n\n# Introduction\n{}\n# Methods\n{}",
            body(3),
            body(2)
        );
        let sections = parse_sections(&content);

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[1].heading.as_deref(), Some("Introduction"));
        assert_eq!(sections[1].anchor.as_deref(), Some("introduction"));
        assert_eq!(sections[2].heading.as_deref(), Some("Methods"));
    }

    #[test]
    fn test_sections_partition_content_exactly() {
        let content = format!("# A\n{}\n# B\n{}", body(4), body(6));
        let sections = parse_sections(&content);
        let joined = sections
            .iter()
            .map(Section::text)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, content);
    }

    #[test]
    fn test_sub_headings_stay_inside_their_section() {
        let content = "# A\ntext\n## A.1\nmore\n# B\nend";
        let sections = parse_sections(content);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].text().contains("## A.1"));
    }

    #[test]
    fn test_atomize_within_budget_is_identity() {
        let sections = parse_sections("# A\nshort");
        let pieces = atomize(sections[0].clone(), 10);
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn test_atomize_recurses_to_sub_headings() {
        let content = format!("# A\n## A.1\n{}\n## A.2\n{}", body(5), body(5));
        let section = parse_sections(&content).remove(0);
        let pieces = atomize(section, 8);

        assert!(pieces.len() >= 2);
        assert!(pieces.iter().all(|p| p.line_count() <= 8));
        let joined = pieces
            .iter()
            .map(Section::text)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, content);
    }

    #[test]
    fn test_atomize_falls_back_to_paragraphs() {
        let content = format!("# A\n{}\n\n{}\n\n{}", body(4), body(4), body(4));
        let section = parse_sections(&content).remove(0);
        let pieces = atomize(section, 6);

        assert!(pieces.iter().all(|p| p.line_count() <= 6));
        let joined = pieces
            .iter()
            .map(Section::text)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, content);
    }

    #[test]
    fn test_atomize_never_truncates_giant_paragraph() {
        let section = Section::from_lines((0..25).map(|i| format!("l{i}")).collect());
        let pieces = atomize(section, 10);

        assert!(pieces.iter().all(|p| p.line_count() <= 10));
        let total: usize = pieces.iter().map(Section::line_count).sum();
        assert_eq!(total, 25);
    }

    #[test]
    fn test_anchors_in_all_levels() {
        let content = "# Top\n## Nested Part\ntext\n### Deep One";
        assert_eq!(anchors_in(content), vec!["top", "nested-part", "deep-one"]);
    }
}
