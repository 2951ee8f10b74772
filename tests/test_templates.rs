use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use insta::assert_snapshot;
use similar_asserts::assert_eq;

use tinyjinja::value::{LazyObject, LazyPropertyProvider};
use tinyjinja::{context, Environment, ErrorKind, RenderOptions, Value};

fn render(source: &str, ctx: Value) -> String {
    Environment::new().render_str(source, ctx).unwrap()
}

#[test]
fn test_plain_text_and_comments() {
    assert_eq!(render("hello world", context! {}), "hello world");
    assert_eq!(render("a{# note to self #}b", context! {}), "ab");
    // a lone apostrophe inside a tag is a plain character
    assert_eq!(render("a{# it's fine #}b", context! {}), "ab");
}

#[test]
fn test_output_escapes_by_default() {
    let ctx = context! { v => "<b>\"quoted\"</b>" };
    assert_snapshot!(
        render("{{ v }}", ctx.clone()),
        @"&lt;b&gt;&quot;quoted&quot;&lt;/b&gt;"
    );
    assert_snapshot!(render("{{ v | safe }}", ctx.clone()), @r#"<b>"quoted"</b>"#);
    assert_snapshot!(render("{{{ v }}}", ctx), @r#"<b>"quoted"</b>"#);
}

#[test]
fn test_explicit_html_filter_is_not_doubled() {
    let ctx = context! { v => "a&b" };
    assert_eq!(render("{{ v | html }}", ctx.clone()), "a&amp;b");
    assert_eq!(render("{{ v }}", ctx), "a&amp;b");
}

#[test]
fn test_auto_escape_can_be_disabled_per_render() {
    let env = Environment::new();
    let template = env.template_from_str("{{ v }}").unwrap();
    let mut options = RenderOptions::default();
    options.auto_escape = None;
    assert_eq!(
        template.render_with(context! { v => "<b>" }, &options).unwrap(),
        "<b>"
    );
}

#[test]
fn test_per_render_filters() {
    let env = Environment::new();
    let template = env.template_from_str("{{ v | shout | safe }}").unwrap();
    let mut options = RenderOptions::default();
    options.add_filter("shout", |value: &Value, _args: &[Value]| {
        Value::from(format!("{}!", value))
    });
    assert_eq!(
        template.render_with(context! { v => "hi" }, &options).unwrap(),
        "hi!"
    );
    // the filter exists only for renders carrying these options
    assert_eq!(
        template.render(context! { v => "hi" }).unwrap_err().kind(),
        ErrorKind::UnknownFilter
    );
}

#[test]
fn test_auto_escape_filter_is_configurable() {
    let mut env = Environment::new();
    env.add_filter("upper", |value: &Value, _: &[Value]| {
        Value::from(value.to_string().to_uppercase())
    });
    env.set_auto_escape(Some("upper"));
    assert_eq!(env.render_str("{{ v }}", context! { v => "hi" }).unwrap(), "HI");
    // a pipeline already ending in the escape filter is left alone
    assert_eq!(
        env.render_str("{{ v | upper }}", context! { v => "hi" }).unwrap(),
        "HI"
    );
    assert_eq!(
        env.render_str("{{ v | safe }}", context! { v => "hi" }).unwrap(),
        "hi"
    );
}

#[test]
fn test_missing_variables_render_empty() {
    assert_eq!(render("[{{ missing }}]", context! {}), "[]");
    assert_eq!(render("[{{ a.b.c.d }}]", context! { a => 42 }), "[]");
}

#[test]
fn test_conditionals() {
    let source = "{% if a %}yes{% elif b %}maybe{% else %}no{% endif %}";
    assert_eq!(render(source, context! { a => true, b => false }), "yes");
    assert_eq!(render(source, context! { a => false, b => true }), "maybe");
    assert_eq!(render(source, context! { a => false, b => false }), "no");
    // elseif and elif spell the same tag
    assert_eq!(
        render(
            "{% if a %}1{% elseif b %}2{% endif %}",
            context! { b => true }
        ),
        "2"
    );
}

#[test]
fn test_truthiness() {
    let source = "{% if v %}t{% else %}f{% endif %}";
    assert_eq!(render(source, context! { v => 0 }), "f");
    assert_eq!(render(source, context! { v => "" }), "f");
    assert_eq!(render(source, context! {}), "f");
    // collections are truthy even when empty
    assert_eq!(render(source, context! { v => Vec::<i32>::new() }), "t");
    assert_eq!(render(source, context! { v => "0" }), "t");
}

#[test]
fn test_loop_metadata() {
    let ctx = context! { items => vec!["foo", "bar", "baz"] };
    assert_eq!(
        render(
            "{% for item in items %}{{ loop.index0 }}:{{ item }} {% endfor %}",
            ctx.clone()
        ),
        "0:foo 1:bar 2:baz "
    );
    assert_eq!(
        render(
            "{% for item in items %}{{ loop.index }}/{{ loop.length }} {% endfor %}",
            ctx.clone()
        ),
        "1/3 2/3 3/3 "
    );
    // first and last are the elements themselves, not flags
    assert_eq!(
        render("{% for item in items %}{{ loop.first }}-{{ loop.last }} {% endfor %}", ctx),
        "foo-baz foo-baz foo-baz "
    );
}

#[test]
fn test_loop_else_runs_when_empty() {
    let source = "{% for item in items %}{{ item }}{% else %}hooray!{% endfor %}";
    assert_eq!(render(source, context! {}), "hooray!");
    assert_eq!(render(source, context! { items => Vec::<i32>::new() }), "hooray!");
    assert_eq!(render(source, context! { items => vec![1, 2] }), "12");
    // scalars iterate as empty
    assert_eq!(render(source, context! { items => 42 }), "hooray!");
    // the loop record is still in scope with length zero
    assert_eq!(
        render(
            "{% for item in items %}x{% else %}len={{ loop.length }}{% endfor %}",
            context! {}
        ),
        "len=0"
    );
}

#[test]
fn test_loop_over_map_yields_keys_in_insertion_order() {
    let ctx = context! { obj => context! { b => 1, a => 2 } };
    assert_eq!(render("{% for k in obj %}{{ k }}{% endfor %}", ctx.clone()), "ba");
    assert_eq!(
        render("{% for k in obj %}{{ obj[k] }}{% endfor %}", ctx),
        "12"
    );
}

#[test]
fn test_set_writes_the_innermost_frame() {
    assert_eq!(
        render("{% set x = 'foo' %}{{ x }}", context! {}),
        "foo"
    );
    // loop frames unwind and take their assignments with them
    assert_eq!(
        render(
            "{% set x = 'a' %}{% for i in items %}{% set x = 'b' %}{{ x }}{% endfor %}{{ x }}",
            context! { items => vec![1] }
        ),
        "ba"
    );
    // assign is the liquid spelling
    assert_eq!(render("{% assign x = 1 + 1 %}{{ x }}", context! {}), "2");
}

#[test]
fn test_standalone_block_shares_the_enclosing_scope() {
    // blocks without inheritance render inline and do not open a frame
    let source = "{% set x='foo' %}{% block a %}{{ x }}{% set x='bar' %}{% endblock %}\
                  {{ x }}{% block b %}{{ x }}{% endblock %}";
    assert_eq!(render(source, context! {}), "foobarbar");
}

#[test]
fn test_variable_paths() {
    let ctx = context! {
        user => context! { name => "Peter", roles => vec!["admin", "dev"] },
        key => "name",
    };
    assert_eq!(render("{{ user.name }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user['name'] }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user[key] }}", ctx.clone()), "Peter");
    assert_eq!(render("{{ user.roles[1] }}", ctx.clone()), "dev");
    assert_eq!(render("{{ user.roles.length }}", ctx.clone()), "2");
    assert_eq!(render("{{ user.name.length }}", ctx), "5");
}

#[test]
fn test_operators_follow_loose_coercions() {
    assert_eq!(render("{{ '3' * 2 }}", context! {}), "6");
    assert_eq!(render("{{ 1 + '1' }}", context! {}), "11");
    assert_eq!(render("{{ 3 / 2 }}", context! {}), "1.5");
    assert_eq!(render("{{ 'a' - 1 }}", context! {}), "NaN");
    assert_eq!(render("{{ x + 1 }}", context! {}), "1");
    assert_eq!(
        render("{% if v == 1 %}eq{% endif %}", context! { v => "1" }),
        "eq"
    );
    assert_eq!(render("{% if true is not false %}ok{% endif %}", context! {}), "ok");
    assert_eq!(render("{% if 1 isnot 2 %}ok{% endif %}", context! {}), "ok");
    assert_eq!(render("{{ +5 }}", context! {}), "5");
}

#[test]
fn test_and_or_yield_operands() {
    assert_eq!(render("{{ missing || 'fallback' }}", context! {}), "fallback");
    assert_eq!(
        render("{{ a or b }}", context! { a => 0, b => "x" }),
        "x"
    );
    assert_eq!(
        render("{{ a && b }}", context! { a => 1, b => "x" }),
        "x"
    );
    assert_eq!(render("{{ a and b }}", context! { a => 0, b => "x" }), "0");
}

#[test]
fn test_filter_argument_styles() {
    let mut env = Environment::new();
    env.add_filter("append", |value: &Value, args: &[Value]| {
        let suffix = args.first().cloned().unwrap_or(Value::NULL);
        Value::from(format!("{value}{suffix}"))
    });
    let ctx = context! { v => "x" };
    assert_eq!(env.render_str("{{ v | append: '!' }}", ctx.clone()).unwrap(), "x!");
    assert_eq!(env.render_str("{{ v | append('!') }}", ctx.clone()).unwrap(), "x!");
    assert_eq!(env.render_str("{{ v | append }}", ctx).unwrap(), "x");
}

#[test]
fn test_unknown_filter_errors() {
    let err = Environment::new()
        .render_str("{{ v | wat }}", context! { v => 1 })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFilter);
    assert_snapshot!(err, @"unknown filter: filter wat is unknown (in <string>)");
}

#[test]
fn test_raw_blocks() {
    assert_eq!(
        render("a {% raw %}{{ not a tag }}{% endraw %} b", context! {}),
        "a {{ not a tag }} b"
    );
    assert_eq!(
        render("{% raw %}{% if %}{% endraw %}", context! {}),
        "{% if %}"
    );
}

#[test]
fn test_whitespace_trim_markers() {
    assert_eq!(render("a  {{- 'b' -}}  c", context! {}), "abc");
    assert_eq!(
        render("x\n  {%- if true -%}\n  y\n  {%- endif -%}\n", context! {}),
        "xy"
    );
    assert_eq!(
        render("a {#- gone -#} b", context! {}),
        "ab"
    );
}

#[test]
fn test_array_and_object_literals() {
    assert_eq!(
        render("{% for n in [1, 2, 3] %}{{ n }}{% endfor %}", context! {}),
        "123"
    );
    assert_eq!(
        render("{% set o = {a: 1, 'b': 2} %}{{ o.a }}{{ o.b }}", context! {}),
        "12"
    );
}

#[test]
fn test_display_forms() {
    assert_eq!(render("{{ v }}", context! { v => vec![1, 2, 3] }), "1,2,3");
    assert_eq!(render("{{ v }}", context! { v => true }), "true");
    assert_eq!(render("{{ v }}", context! { v => 1.0 }), "1");
    assert_eq!(render("{{ v }}", context! { v => () }), "");
}

#[derive(Debug)]
struct Deferred(Arc<AtomicUsize>);

impl LazyPropertyProvider for Deferred {
    fn resolve(&self, name: &str) -> Value {
        self.0.fetch_add(1, Ordering::SeqCst);
        match name {
            "title" => Value::from("Deferred Title"),
            _ => Value::NULL,
        }
    }
}

#[test]
fn test_lazy_properties_resolve_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let ctx = context! {
        settings => Value::from_object(LazyObject::new(Deferred(calls.clone()))),
    };
    assert_eq!(
        render("{{ settings.title }}|{{ settings.title }}", ctx),
        "Deferred Title|Deferred Title"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
