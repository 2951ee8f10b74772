use insta::assert_snapshot;
use similar_asserts::assert_eq;

use tinyjinja::{context, Environment, ErrorKind};

fn env_with(templates: &[(&str, &str)]) -> Environment {
    let mut env = Environment::new();
    for (name, source) in templates {
        env.add_template(name, source);
    }
    env
}

#[test]
fn test_child_overrides_block() {
    let env = env_with(&[
        (
            "base.html",
            "<title>{% block title %}Default{% endblock %}</title>",
        ),
        (
            "child.html",
            "{% extends 'base.html' %}{% block title %}Child{% endblock %}",
        ),
    ]);
    assert_snapshot!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        @"<title>Child</title>"
    );
    // the base still renders its own default
    assert_snapshot!(
        env.get_template("base.html").unwrap().render(context! {}).unwrap(),
        @"<title>Default</title>"
    );
}

#[test]
fn test_unoverridden_blocks_keep_their_default() {
    let env = env_with(&[
        (
            "base.html",
            "{% block a %}A{% endblock %}{% block b %}B{% endblock %}",
        ),
        (
            "child.html",
            "{% extends 'base.html' %}{% block b %}B2{% endblock %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        "AB2"
    );
}

#[test]
fn test_three_level_inheritance() {
    let env = env_with(&[
        (
            "grand.html",
            "[{% block a %}ga{% endblock %}|{% block b %}gb{% endblock %}]",
        ),
        (
            "parent.html",
            "{% extends 'grand.html' %}{% block a %}pa{% endblock %}",
        ),
        (
            "child.html",
            "{% extends 'parent.html' %}{% block b %}cb{% endblock %}",
        ),
    ]);
    let template = env.get_template("child.html").unwrap();
    assert_eq!(template.render(context! {}).unwrap(), "[pa|cb]");
    assert_eq!(template.ancestors(), ["parent.html", "grand.html"]);
    // the middle template on its own only picks up its own override
    assert_eq!(
        env.get_template("parent.html").unwrap().render(context! {}).unwrap(),
        "[pa|gb]"
    );
}

#[test]
fn test_nearest_override_wins_over_intermediate() {
    let env = env_with(&[
        ("grand.html", "{% block a %}ga{% endblock %}"),
        (
            "parent.html",
            "{% extends 'grand.html' %}{% block a %}pa{% endblock %}",
        ),
        (
            "child.html",
            "{% extends 'parent.html' %}{% block a %}ca{% endblock %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        "ca"
    );
}

#[test]
fn test_child_content_outside_blocks_is_dropped() {
    let env = env_with(&[
        ("base.html", "A{% block x %}B{% endblock %}C"),
        (
            "child.html",
            "{% extends 'base.html' %}dropped {{ also.dropped }} {% if true %}gone{% endif %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        "ABC"
    );
}

#[test]
fn test_inherited_blocks_open_a_scope_frame() {
    let env = env_with(&[
        (
            "base.html",
            "{% set x = 'outer' %}{% block a %}{% endblock %}{{ x }}",
        ),
        (
            "child.html",
            "{% extends 'base.html' %}{% block a %}{{ x }}{% set x = 'inner' %}{{ x }}-{% endblock %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        "outerinner-outer"
    );
}

#[test]
fn test_anonymous_blocks_pair_by_ordinal() {
    // the n-th unnamed block of a child overrides the n-th of its parent
    let env = env_with(&[
        (
            "base.html",
            "[{% block %}a{% endblock %}|{% block %}b{% endblock %}]",
        ),
        (
            "child.html",
            "{% extends 'base.html' %}{% block %}A{% endblock %}{% block %}B{% endblock %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html").unwrap().render(context! {}).unwrap(),
        "[A|B]"
    );
}

#[test]
fn test_blocks_see_the_render_context() {
    let env = env_with(&[
        ("base.html", "{% block a %}{% endblock %}"),
        (
            "child.html",
            "{% extends 'base.html' %}{% block a %}Hello {{ name }}!{% endblock %}",
        ),
    ]);
    assert_eq!(
        env.get_template("child.html")
            .unwrap()
            .render(context! { name => "World" })
            .unwrap(),
        "Hello World!"
    );
}

#[test]
fn test_extends_must_be_first() {
    let env = env_with(&[("base.html", "x")]);
    let err = env
        .render_str("hello {% extends 'base.html' %}", context! {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    // comments and leading whitespace do not count as content
    assert_eq!(
        env.render_str("{# header #}\n{% extends 'base.html' %}", context! {})
            .unwrap(),
        "x"
    );
}

#[test]
fn test_missing_parent_is_not_found() {
    let env = Environment::new();
    let err = env
        .render_str("{% extends 'nowhere.html' %}", context! {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_circular_extends_is_detected() {
    let env = env_with(&[
        ("a.html", "{% extends 'b.html' %}"),
        ("b.html", "{% extends 'a.html' %}"),
        ("self.html", "{% extends 'self.html' %}"),
    ]);
    assert_eq!(
        env.get_template("a.html").unwrap_err().kind(),
        ErrorKind::CircularReference
    );
    assert_eq!(
        env.get_template("self.html").unwrap_err().kind(),
        ErrorKind::CircularReference
    );
}

#[test]
fn test_duplicate_block_names_error() {
    let env = Environment::new();
    let err = env
        .render_str(
            "{% extends 'base' %}{% block a %}1{% endblock %}{% block a %}2{% endblock %}",
            context! {},
        )
        .unwrap_err();
    // the parent resolves eagerly, so the missing parent is hit first
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);

    let err = env
        .render_str(
            "{% block a %}1{% endblock %}{% block a %}2{% endblock %}",
            context! {},
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}

#[test]
fn test_include_renders_inline() {
    let env = env_with(&[
        ("partial.html", "B{{ v }}"),
        ("page.html", "A{% include 'partial.html' %}C"),
    ]);
    assert_eq!(
        env.get_template("page.html")
            .unwrap()
            .render(context! { v => "!" })
            .unwrap(),
        "AB!C"
    );
}

#[test]
fn test_include_shares_the_enclosing_scope() {
    let env = env_with(&[
        ("item.html", "{{ item }}:{{ loop.index }} {% set seen = item %}"),
        (
            "list.html",
            "{% for item in items %}{% include 'item.html' %}{% endfor %}{{ seen }}",
        ),
    ]);
    // no frame around the inclusion: it reads the loop variables and its
    // assignment lands in the loop frame
    assert_eq!(
        env.get_template("list.html")
            .unwrap()
            .render(context! { items => vec!["a", "b"] })
            .unwrap(),
        "a:1 b:2 "
    );
}

#[test]
fn test_missing_include_is_not_found() {
    let env = Environment::new();
    let err = env
        .render_str("{% include 'nowhere.html' %}", context! {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_circular_includes_are_detected() {
    let env = env_with(&[
        ("a.html", "{% include 'b.html' %}"),
        ("b.html", "{% include 'a.html' %}"),
        ("self.html", "{% include 'self.html' %}"),
    ]);
    assert_eq!(
        env.get_template("a.html").unwrap_err().kind(),
        ErrorKind::CircularReference
    );
    assert_eq!(
        env.get_template("self.html").unwrap_err().kind(),
        ErrorKind::CircularReference
    );
}

#[test]
fn test_extends_inside_an_include_is_rejected() {
    let env = env_with(&[
        ("base.html", "{% block a %}{% endblock %}"),
        ("partial.html", "{% extends 'base.html' %}"),
        ("page.html", "{% include 'partial.html' %}"),
    ]);
    let err = env.get_template("page.html").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_snapshot!(
        err,
        @"syntax error: `extends` is not allowed in included templates (in partial.html:1)"
    );
}

#[test]
fn test_templates_resolve_through_the_loader() {
    let mut env = Environment::new();
    env.set_loader(|name| match name {
        "base.html" => Ok(Some("A{% block x %}B{% endblock %}C".to_string())),
        _ => Ok(None),
    });
    assert_eq!(
        env.render_str("{% extends 'base.html' %}{% block x %}!{% endblock %}", context! {})
            .unwrap(),
        "A!C"
    );
    assert_eq!(
        env.get_template("missing.html").unwrap_err().kind(),
        ErrorKind::TemplateNotFound
    );
}
