use crate::tt_parser::parse_program;

fn assert_syntax_error(input: &str) {
    let err = parse_program(input).expect_err(&format!("`{input}` should not parse"));
    assert!(
        err.to_string().contains("syntax error"),
        "unexpected error text: {err}"
    );
}

#[test]
fn missing_semicolon() {
    assert_syntax_error("now => @com.foo.q() => notify");
}

#[test]
fn dangling_arrow() {
    assert_syntax_error("now => ;");
}

#[test]
fn bad_filter_operator() {
    assert_syntax_error("@com.foo.q(), x <> 2;");
}

#[test]
fn unterminated_string() {
    assert_syntax_error(r#"now => @com.twitter.post(status="oops);"#);
}

#[test]
fn class_without_body() {
    assert_syntax_error("class @com.foo;");
}

#[test]
fn executor_without_colon() {
    assert_syntax_error(r#"executor = "1234"^^tt:contact now => @a.q() => notify;"#);
}

#[test]
fn timer_requires_base_and_interval() {
    assert_syntax_error("timer(interval=1h) => notify;");
}
