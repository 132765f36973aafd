//! Greedy, boundary-aware split planning.

use super::section::{anchors_in, atomize, parse_sections, Section};

/// One planned part: an ordered run of sections.
#[derive(Debug, Clone)]
pub struct PlannedPart {
    /// The 1-based part index.
    pub index: u32,
    sections: Vec<Section>,
}

impl PlannedPart {
    /// Returns the part size in lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.sections.iter().map(Section::line_count).sum()
    }

    /// Returns the part content, line structure intact.
    #[must_use]
    pub fn content(&self) -> String {
        self.sections
            .iter()
            .map(Section::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the anchor slugs of every heading in the part.
    #[must_use]
    pub fn anchors(&self) -> Vec<String> {
        anchors_in(&self.content())
    }

    /// A one-line description of the part's coverage, from its first and
    /// last headings.
    #[must_use]
    pub fn coverage(&self) -> String {
        let headings: Vec<&str> = self
            .sections
            .iter()
            .filter_map(|s| s.heading.as_deref())
            .collect();
        match (headings.first(), headings.last()) {
            (Some(first), Some(last)) if first == last => (*first).to_string(),
            (Some(first), Some(last)) => format!("{first} .. {last}"),
            _ => "untitled content".to_string(),
        }
    }
}

/// A computed split plan for one artifact.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// The budget the plan was computed against, in lines.
    pub budget: usize,
    /// The planned parts, in content order.
    pub parts: Vec<PlannedPart>,
}

impl SplitPlan {
    /// Returns the number of planned parts.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Returns the total planned size in lines.
    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.parts.iter().map(PlannedPart::line_count).sum()
    }

    /// Returns the per-part line counts, the boundary fingerprint used for
    /// idempotence checks.
    #[must_use]
    pub fn boundaries(&self) -> Vec<usize> {
        self.parts.iter().map(PlannedPart::line_count).collect()
    }

    /// Returns the part an anchor would land in.
    #[must_use]
    pub fn part_for_anchor(&self, anchor: &str) -> Option<u32> {
        self.parts
            .iter()
            .find(|part| part.anchors().iter().any(|a| a == anchor))
            .map(|part| part.index)
    }
}

/// Computes a split plan: boundary discovery, greedy packing, and the
/// small-remainder merge.
///
/// Consecutive sections accumulate into the current part until the next
/// section would exceed the budget; a single section over the budget is
/// recursively split at the next finer boundary. A final part smaller
/// than `merge_threshold` of the budget is merged into its predecessor;
/// the merged part may exceed the budget by at most the threshold.
#[must_use]
pub fn plan_split(content: &str, budget: usize, merge_threshold: f64) -> SplitPlan {
    let pieces: Vec<Section> = parse_sections(content)
        .into_iter()
        .flat_map(|s| atomize(s, budget))
        .collect();

    let mut groups: Vec<Vec<Section>> = Vec::new();
    let mut current: Vec<Section> = Vec::new();
    let mut current_lines = 0usize;
    for piece in pieces {
        if current_lines + piece.line_count() > budget && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
            current_lines = 0;
        }
        current_lines += piece.line_count();
        current.push(piece);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    if groups.len() >= 2 {
        let last_lines: usize = groups[groups.len() - 1]
            .iter()
            .map(Section::line_count)
            .sum();
        #[allow(clippy::cast_precision_loss)]
        if (last_lines as f64) < merge_threshold * budget as f64 {
            if let Some(tail) = groups.pop() {
                if let Some(prev) = groups.last_mut() {
                    prev.extend(tail);
                }
            }
        }
    }

    let parts = groups
        .into_iter()
        .enumerate()
        .map(|(i, sections)| PlannedPart {
            index: i as u32 + 1,
            sections,
        })
        .collect();

    SplitPlan { budget, parts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sectioned_content(section_lines: &[usize]) -> String {
        let mut out = Vec::new();
        for (i, &n) in section_lines.iter().enumerate() {
            out.push(format!("# Section {i}"));
            for j in 1..n {
                out.push(format!("s{i} line {j}"));
            }
        }
        out.join("\n")
    }

    #[test]
    fn test_budget_scenario_two_parts() {
        // 24 sections of 100 lines plus one of 34: 2,434 lines total.
        let mut sizes = vec![100usize; 24];
        sizes.push(34);
        let content = sectioned_content(&sizes);

        let plan = plan_split(&content, 1500, 0.10);

        assert_eq!(plan.part_count(), 2);
        assert!(plan.parts.iter().all(|p| p.line_count() <= 1500));
        assert_eq!(plan.total_lines(), 2434);
        // No overlap, no gap: concatenation reproduces the content.
        let joined = plan
            .parts
            .iter()
            .map(PlannedPart::content)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, content);
    }

    #[test]
    fn test_part_count_bounded_by_ceil() {
        let content = sectioned_content(&[40, 40, 40, 40, 40]);
        let plan = plan_split(&content, 100, 0.10);
        // 200 lines with budget 100: at most ceil(200/100) + slack from
        // boundary alignment, and here exactly 3 (80+80+40).
        assert_eq!(plan.boundaries(), vec![80, 80, 40]);
    }

    #[test]
    fn test_small_remainder_merges_into_predecessor() {
        let content = sectioned_content(&[95, 8]);
        let plan = plan_split(&content, 100, 0.10);

        // 8 < 10% of 100: merged rather than emitted near-empty.
        assert_eq!(plan.part_count(), 1);
        assert_eq!(plan.total_lines(), 103);
    }

    #[test]
    fn test_remainder_above_threshold_stays_separate() {
        let content = sectioned_content(&[95, 20]);
        let plan = plan_split(&content, 100, 0.10);
        assert_eq!(plan.boundaries(), vec![95, 20]);
    }

    #[test]
    fn test_oversized_section_is_refined_not_truncated() {
        // One section far over budget, no sub-headings: paragraph fallback.
        let mut lines = vec!["# Giant".to_string()];
        for i in 0..30 {
            lines.push(format!("line {i}"));
            if i % 10 == 9 {
                lines.push(String::new());
            }
        }
        let content = lines.join("\n");
        let plan = plan_split(&content, 12, 0.10);

        assert!(plan.parts.iter().all(|p| p.line_count() <= 12));
        assert_eq!(plan.total_lines(), lines.len());
    }

    #[test]
    fn test_part_for_anchor() {
        let content = sectioned_content(&[60, 60, 60]);
        let plan = plan_split(&content, 100, 0.10);

        assert_eq!(plan.part_for_anchor("section-0"), Some(1));
        assert_eq!(plan.part_for_anchor("section-1"), Some(2));
        assert_eq!(plan.part_for_anchor("section-2"), Some(3));
        assert_eq!(plan.part_for_anchor("missing"), None);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let content = sectioned_content(&[70, 50, 30, 90]);
        let first = plan_split(&content, 120, 0.10);
        let second = plan_split(&content, 120, 0.10);
        assert_eq!(first.boundaries(), second.boundaries());
    }

    #[test]
    fn test_coverage_describes_heading_range() {
        let content = sectioned_content(&[10, 10]);
        let plan = plan_split(&content, 100, 0.10);
        assert_eq!(plan.parts[0].coverage(), "Section 0 .. Section 1");
    }
}
