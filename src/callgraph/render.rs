//! Human-readable box-drawing rendering of a [`super::CallGraph`] or a
//! [`crate::flamegraph::FlameGraph`] subtree, grounded directly in
//! `kolloch-reqray::display::DisplayableCallPathTiming` -- the same
//! indent/connector walk, just over a sealed tree built from samples
//! instead of one built from live span events.

use core::fmt;

use crate::flamegraph::FlameNode;

/// Renders a [`FlameNode`] subtree the way the teacher renders a
/// `CallPathTiming` subtree: one line per node, `# calls` replaced with
/// `value`/`self` (flame graphs have no call count), connectors
/// `┬`/`├`/`╰`/`─` marking branch shape.
pub struct DisplayableFlameNode<'a> {
    pub node: &'a FlameNode,
    pub left_margin: usize,
}

impl<'a> fmt::Display for DisplayableFlameNode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}      value │    self │ call tree",
            "",
            indent = self.left_margin
        )?;
        writeln!(
            f,
            "{:indent$}───────────┼─────────┼───────────────────────",
            "",
            indent = self.left_margin
        )?;
        let mut last = vec![true];
        fmt_node(self.node, &mut last, self.left_margin, f)
    }
}

fn fmt_node(node: &FlameNode, last: &mut Vec<bool>, left_margin: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
        f,
        "{:indent$}{: >10} │ {: >7} │ ",
        "",
        node.value,
        node.self_value,
        indent = left_margin
    )?;

    let child_connector = if node.children.is_empty() { "─" } else { "┬" };
    match last.len() {
        1 => writeln!(f, "{child_connector} {}", node.name)?,
        _ => {
            if last.len() > 2 {
                for is_last in last.iter().skip(1).take(last.len() - 2) {
                    f.write_str(if *is_last { " " } else { "┊" })?;
                }
            }
            let connect_me = if *last.last().unwrap() { "╰" } else { "├" };
            f.write_str(connect_me)?;
            f.write_str(child_connector)?;
            writeln!(f, " {}", node.name)?;
        }
    }

    let last_idx = node.children.len().saturating_sub(1);
    for (idx, child) in node.children.iter().enumerate() {
        last.push(idx == last_idx);
        fmt_node(child, last, left_margin, f)?;
        last.pop();
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flamegraph::build;
    use crate::config::FlameGraphOptions;
    use crate::model::Sample;

    #[test]
    fn renders_single_leaf() {
        let samples = vec![Sample::new("t", -1, vec!["leaf".to_string()], 5)];
        let flame = build(&samples, &FlameGraphOptions::default());
        let rendered = format!("{}", DisplayableFlameNode { node: &flame.root, left_margin: 0 });
        assert!(rendered.contains("─ root"));
        assert!(rendered.contains("╰─ leaf"));
    }

    #[test]
    fn branching_nodes_use_tee_connector() {
        let samples = vec![
            Sample::new("t", -1, vec!["a".to_string()], 1),
            Sample::new("t", -1, vec!["b".to_string()], 1),
        ];
        let flame = build(&samples, &FlameGraphOptions::default());
        let rendered = format!("{}", DisplayableFlameNode { node: &flame.root, left_margin: 0 });
        assert!(rendered.contains("┬ root"));
    }
}
