use super::*;

#[test]
fn bare_query_prints_verbatim() {
    let input = "@com.xkcd.get_comic(number=1234);";
    let program = parse_ok(input);
    assert_eq!(pretty_print(&program), input);
}

#[test]
fn statements_roundtrip() {
    let cases = [
        "@com.xkcd.get_comic(number=1234);",
        r#"now => @com.twitter.post(status="hello world");"#,
        r#"monitor @org.weather.current(location=new Location(1, 3, "Somewhere")) => notify;"#,
        "monitor @org.weather.current(location=$?) on new [temperature] => notify;",
        r#"timer(base=$now, interval=1h) => @com.twitter.post(status="tick");"#,
        "timer(base=$now, interval=30min, frequency=2) => notify;",
        "attimer(time=[new Time(10, 30)], expiration_date=$end_of(week)) => notify;",
        "@org.weather.current(location=$?), temperature >= 20C;",
        "@com.foo.q(), (a > 42) && ((a <= 42.5) || (b > 7));",
        "@com.foo.q(), !(flag == true);",
        "@com.foo.q(), @com.bar.check(x=1) { y == 2 };",
        "[title] of (sort score desc of @com.foo.q());",
        "@com.foo.q()[1];",
        "@com.foo.q()[1, 3, -1];",
        "@com.foo.q()[2 : 5];",
        "aggregate count of @com.foo.q();",
        "aggregate avg temperature of @org.weather.current(location=$?);",
        "argmax 1, 5 score of @com.foo.q();",
        "now => @a.q() join @b.q() on (x=y) => notify;",
        "monitor @a.q() join @b.q() => notify;",
        "(monitor @a.q()), x == 1 => notify;",
        r#"executor = "1234"^^tt:contact : now => @security-camera.current_event() => return;"#,
        "let query comics := @com.xkcd.get_comic(number=42);",
        "let stream weather_changes := monitor @org.weather.current(location=$?);",
        r#"let action shout := @com.twitter.post(status="AAA");"#,
        "let procedure announce := @com.twitter.post(status=$?);",
        "now => result(@announce) => notify;",
        r#"@com.hue(id="hue-1"^^tt:device_id).set_power(power=enum(on));"#,
        r#"now => @com.foo.q(when=new Date("2020-06-01T00:00:00Z")) => notify;"#,
        "@com.foo.q(), count(tags) >= 3;",
        "@com.foo.q(), (score + bonus) > 10;",
        r#"@com.gmail.inbox(), sender == "bob"^^tt:email_address("Bob");"#,
        "@com.foo.q(labels=[enum(a), enum(b)]);",
        r#"now => @com.payments.send(amount=new Currency(10, usd)) ;"#,
    ];
    for case in cases {
        roundtrip(case);
    }
}

#[test]
fn multi_statement_program_roundtrips() {
    roundtrip(
        "let query comics := @com.xkcd.get_comic(number=42);\n\
         comics();\n\
         monitor @org.weather.current(location=$?) => @com.twitter.post(status=$event);",
    );
}

#[test]
fn printed_form_is_stable() {
    // pretty_print ∘ parse is a fixpoint on canonical text.
    let cases = [
        "@com.foo.q(), (a > 42) && ((a <= 42.5) || (b > 7));",
        "argmax 1, 5 score of @com.foo.q();",
        "monitor @org.weather.current(location=$?) => notify;",
    ];
    for case in cases {
        let once = pretty_print(&parse_ok(case));
        let twice = pretty_print(&parse_ok(&once));
        assert_eq!(once, twice);
    }
}
