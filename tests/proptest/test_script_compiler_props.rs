//! Property-Based Tests for Script Compilation

use proptest::prelude::*;

use fleetshell::models::RowFragment;
use fleetshell::script::ScriptCompiler;

fn fragments() -> impl Strategy<Value = Vec<RowFragment>> {
    prop::collection::vec(prop::collection::vec("[a-z ]{0,12}", 0..6), 1..8).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, commands)| RowFragment::new(i + 1, commands))
            .collect()
    })
}

proptest! {
    #[test]
    fn one_delimiter_per_row_plus_trailer(fragments in fragments()) {
        let artifact = ScriptCompiler::new("#").compile("SW1", &fragments);
        let text = artifact.render();
        let delimiters = text.lines().filter(|l| *l == "#").count();
        prop_assert_eq!(delimiters, fragments.len() + 1);
        prop_assert_eq!(artifact.delimiter_count(), fragments.len() + 1);
    }

    #[test]
    fn every_cell_is_written_verbatim(fragments in fragments()) {
        let text = ScriptCompiler::new("#").compile("SW1", &fragments).render();
        let expected_lines: usize = fragments.iter().map(|f| f.commands.len() + 1).sum::<usize>() + 1;
        prop_assert_eq!(text.matches('\n').count(), expected_lines);

        let mut lines = text.split('\n');
        for fragment in &fragments {
            prop_assert_eq!(lines.next(), Some("#"));
            for command in &fragment.commands {
                prop_assert_eq!(lines.next(), Some(command.as_str()));
            }
        }
        prop_assert_eq!(lines.next(), Some("#"));
        prop_assert!(text.ends_with("#\n"));
    }
}
