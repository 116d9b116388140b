//! Unit tests for the structural source repair pass.

use chalkboard::pipeline::stages::repair_source;

#[test]
fn balanced_source_is_unchanged() {
    let src = "from manim import *\n\nclass Explainer(Scene):\n    def construct(self):\n        pass\n";
    assert_eq!(repair_source(src), src);
}

#[test]
fn unclosed_parentheses_are_balanced() {
    let src = "self.play(Write(title)";
    let repaired = repair_source(src);
    assert_eq!(repaired.matches('(').count(), repaired.matches(')').count());
}

#[test]
fn unclosed_brackets_and_braces_are_balanced() {
    let src = "values = [1, 2, {\"k\": 3";
    let repaired = repair_source(src);
    assert_eq!(repaired.matches('[').count(), repaired.matches(']').count());
    assert_eq!(repaired.matches('{').count(), repaired.matches('}').count());
}

#[test]
fn deprecated_show_creation_becomes_create() {
    let src = "self.play(ShowCreation(circle))";
    let repaired = repair_source(src);
    assert!(repaired.contains("Create(circle)"));
    assert!(!repaired.contains("ShowCreation"));
}

#[test]
fn deprecated_circle_indicate_becomes_indicate() {
    let src = "self.play(CircleIndicate(dot))";
    let repaired = repair_source(src);
    assert!(repaired.contains("Indicate(dot)"));
    assert!(!repaired.contains("CircleIndicate"));
}

#[test]
fn repair_does_not_add_delimiters_when_closes_exceed_opens() {
    let src = "x = f(y))";
    let repaired = repair_source(src);
    assert_eq!(repaired, src);
}
