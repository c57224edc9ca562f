use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::buffer::Buffer;

fn state(marked: &str) -> SelectedBuffer {
	SelectedBuffer::with_cursor_marker(marked, "$")
}

fn snip(replace: (usize, usize), template: &str) -> Completion {
	Completion::new(Selection::new(replace.0, replace.1), Snippet::parse(template).unwrap())
}

#[test]
fn after_inside_previous_insertion() {
	let first = Completion::text(Selection::cursor(3), ".");
	let second = Completion::text(Selection::cursor(4), "bar");
	let composed = second.after(&first).unwrap();
	assert_eq!(composed, Completion::text(Selection::cursor(3), ".bar"));
}

#[test]
fn after_surrounding_previous_insertion() {
	// "ab" -> "aXb" -> "Z"
	let first = Completion::text(Selection::cursor(1), "X");
	let second = Completion::text(Selection::new(0, 3), "Z");
	let composed = second.after(&first).unwrap();
	assert_eq!(composed, Completion::text(Selection::new(0, 2), "Z"));
}

#[test]
fn after_overlapping_left_and_right() {
	// "abc" -> "aXYc" -> "QYc"
	let first = Completion::text(Selection::new(1, 2), "XY");
	let left = Completion::text(Selection::new(0, 2), "Q");
	assert_eq!(left.after(&first).unwrap(), Completion::text(Selection::new(0, 2), "QY"));

	// "abc" -> "aXYc" -> "aXR"
	let right = Completion::text(Selection::new(2, 4), "R");
	assert_eq!(right.after(&first).unwrap(), Completion::text(Selection::new(1, 3), "XR"));
}

#[test]
fn after_adjacent_composes() {
	let first = Completion::text(Selection::cursor(2), "xy");
	let second = Completion::text(Selection::cursor(4), "z");
	assert_eq!(second.after(&first).unwrap(), Completion::text(Selection::cursor(2), "xyz"));
}

#[test]
fn after_disjoint_fails() {
	let first = Completion::text(Selection::cursor(5), "x");
	let second = Completion::text(Selection::cursor(1), "y");
	assert!(matches!(second.after(&first), Err(ComposeError::Disjoint { .. })));
}

#[test]
fn after_fills_placeholder() {
	let first = snip((0, 0), "f(${})");
	let second = Completion::text(Selection::cursor(2), "x");
	let composed = second.after(&first).unwrap();
	assert_eq!(composed.snippet.text(), "f(x)");
	assert!(composed.snippet.placeholders().is_empty());
}

#[test]
fn after_keeps_untouched_placeholders() {
	let first = snip((0, 0), "f(${a}, ${b})");
	let second = snip((2, 3), "${xx}");
	let composed = second.after(&first).unwrap();
	assert_eq!(composed.snippet.text(), "f(xx, b)");
	assert_eq!(composed.snippet.placeholders(), &[Selection::new(2, 4), Selection::new(6, 7)]);
}

#[test]
fn follow_on_states_cover_placeholders_and_end() {
	let sb = state("x = $");
	let c = snip((4, 4), "f(${a})");
	let states: Vec<String> = c.follow_on_states(&sb).unwrap().iter().map(ToString::to_string).collect();
	assert_eq!(states, vec!["x = f([a])".to_owned(), "x = f(a)‸".to_owned()]);
}

#[test]
fn validate_strips_non_ident_prefix() {
	let sb = state("json.d$");
	let c = Completion::text(Selection::new(0, 6), "json.dumps");
	let valid = c.validate(&sb).unwrap();
	assert_eq!(valid, Completion::text(Selection::new(5, 6), "dumps"));
}

#[test]
fn validate_matches_identifier_case_insensitively() {
	let sb = state("json.D$");
	assert!(Completion::text(Selection::new(5, 6), "dumps").validate(&sb).is_some());
	assert!(Completion::text(Selection::new(5, 6), "loads").validate(&sb).is_none());
}

#[test]
fn validate_absorbs_identifier_before_replace() {
	let sb = state("foo$");
	let valid = Completion::text(Selection::cursor(3), "bar").validate(&sb).unwrap();
	assert_eq!(valid, Completion::text(Selection::new(0, 3), "foobar"));
}

#[test]
fn validate_checks_case_before_absorbing() {
	// Only the identifier typed inside the replace range is compared; the
	// absorbed part keeps the buffer's spelling.
	let sb = state("Foo$");
	let valid = Completion::text(Selection::new(1, 3), "OOBAR").validate(&sb).unwrap();
	assert_eq!(valid, Completion::text(Selection::new(0, 3), "FOOBAR"));
	assert!(Completion::text(Selection::new(1, 3), "FOOBAR").validate(&sb).is_none());
}

#[test]
fn validate_requires_typed_suffix() {
	let sb = state("foo($)");
	assert!(Completion::text(Selection::new(4, 5), "x)").validate(&sb).is_some());
	assert!(Completion::text(Selection::new(4, 5), "x]").validate(&sb).is_none());
}

#[test]
fn validate_selection_requires_exact_replace() {
	let sb = Buffer::new("hello").select(Selection::new(1, 3));
	assert!(Completion::text(Selection::new(1, 3), "x").validate(&sb).is_some());
	assert!(Completion::text(Selection::new(1, 4), "x").validate(&sb).is_none());
}

#[test]
fn validate_rejects_replace_not_covering_cursor() {
	let sb = state("ab$cd");
	assert!(Completion::text(Selection::new(3, 4), "x").validate(&sb).is_none());
}

#[test]
fn display_collapses_empty_placeholders() {
	let sb = state("$");
	let c = snip((0, 0), "f(${}, ${})");
	assert_eq!(c.display_text(&sb, DisplayOptions::default()), "f(…)");
	let ascii = DisplayOptions {
		no_unicode: true,
		..Default::default()
	};
	assert_eq!(c.display_text(&sb, ascii), "f(...)");
}

#[test]
fn display_trims_before_empty_placeholder() {
	let sb = state("$");
	let opts = DisplayOptions {
		trim_before_empty_placeholder: true,
		..Default::default()
	};
	assert_eq!(snip((0, 0), "open(${})").display_text(&sb, opts), "open(");
}

#[test]
fn display_drops_placeholder_at_end() {
	let sb = state("$");
	assert_eq!(snip((0, 0), "foo${}").display_text(&sb, DisplayOptions::default()), "foo");
}

#[test]
fn display_joins_lines() {
	let sb = state("$");
	let c = Completion::text(Selection::cursor(0), "if x:\n    pass\n");
	assert_eq!(c.display_text(&sb, DisplayOptions::default()), "if x: ⏎ pass");
	let ascii = DisplayOptions {
		no_unicode: true,
		..Default::default()
	};
	assert_eq!(c.display_text(&sb, ascii), "if x: \\n pass");
}

#[test]
fn display_trims_non_identifier_typed_suffix() {
	let sb = state("foo($)");
	let c = Completion::text(Selection::new(4, 5), "x)");
	assert_eq!(c.display_text(&sb, DisplayOptions::default()), "x");
}

#[test]
fn display_of_invalid_completion_is_empty() {
	let sb = state("abc$");
	assert_eq!(Completion::text(Selection::cursor(3), ".").display_text(&sb, DisplayOptions::default()), "abc.");
	assert_eq!(Completion::text(Selection::new(0, 3), "xyz").display_text(&sb, DisplayOptions::default()), "");
}

#[test]
fn prepend_extends_left() {
	let c = snip((4, 5), "x${y}");
	let p = c.prepend("foo(").unwrap();
	assert_eq!(p.replace, Selection::new(0, 5));
	assert_eq!(p.snippet.text(), "foo(xy");
	assert_eq!(p.snippet.placeholders(), &[Selection::new(5, 6)]);
	assert!(c.prepend("too long").is_none());
}

#[test]
fn exact_case_helpers() {
	let sb = state("json.Du$");
	assert!(Completion::text(Selection::new(5, 7), "Dump").exact_case_match_preceding_ident(&sb));
	assert!(!Completion::text(Selection::new(5, 7), "dump").exact_case_match_preceding_ident(&sb));

	let sb = state("$Bar");
	assert!(Completion::text(Selection::new(0, 3), "FooBar").exact_case_match_suffix(&sb));
	assert!(!Completion::text(Selection::new(0, 3), "Foobar").exact_case_match_suffix(&sb));
}

#[test]
fn noop_detection() {
	let sb = state("foo$");
	assert!(Completion::text(Selection::new(0, 3), "foo").is_noop(&sb));
	assert!(!Completion::text(Selection::new(0, 3), "food").is_noop(&sb));
}

#[test]
fn trailing_ident_stops_at_punctuation() {
	assert_eq!(trailing_ident("json.du_2"), "du_2");
	assert_eq!(trailing_ident("x."), "");
	assert_eq!(trailing_ident("héllo"), "héllo");
}

fn arb_range(len: usize) -> impl Strategy<Value = Selection> {
	(0..=len, 0..=len).prop_map(|(a, b)| Selection::new(a.min(b), a.max(b)))
}

fn arb_composition() -> impl Strategy<Value = (String, Completion, Completion)> {
	"[a-c]{0,8}"
		.prop_flat_map(|doc| {
			let len = doc.len();
			(Just(doc), arb_range(len), "[x-z]{0,4}")
		})
		.prop_flat_map(|(doc, replace, text)| {
			let first = Completion::text(replace, text);
			let len = doc.len() - first.replace.len() + first.snippet.len();
			(Just(doc), Just(first), arb_range(len), "[p-r]{0,4}")
		})
		.prop_map(|(doc, first, replace, text)| (doc, first, Completion::text(replace, text)))
}

proptest! {
	/// Applying the composed completion equals applying both in sequence.
	#[test]
	fn prop_after_matches_sequential_application((doc, first, second) in arb_composition()) {
		let s0 = Buffer::new(doc).select(Selection::cursor(0));
		let s1 = first.apply(&s0).unwrap();
		let s2 = second.apply(&s1).unwrap();

		match second.after(&first) {
			Ok(composed) => {
				let direct = composed.apply(&s0).unwrap();
				prop_assert_eq!(direct.text(), s2.text());
			}
			Err(ComposeError::Disjoint { .. }) => {
				let inserted = first.inserted();
				prop_assert!(second.replace.end < inserted.begin || second.replace.begin > inserted.end);
			}
			Err(e) => prop_assert!(false, "unexpected error: {e}"),
		}
	}
}
