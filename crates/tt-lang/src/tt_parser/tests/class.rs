use super::*;

const WEATHER_CLASS: &str = r#"
class @org.weather {
  monitorable list query current(in req location : Location, out temperature : Measure(C), out summary : String) #[minimal_projection=["temperature"]] #[poll_interval=10min];
  action alert(in req message : String #[prompt="What should the alert say?"]);
}
"#;

#[test]
fn class_members_and_attributes() {
    let class = parse_class(WEATHER_CLASS).unwrap();
    assert_eq!(class.kind, "org.weather");
    assert_eq!(class.queries.len(), 1);
    assert_eq!(class.actions.len(), 1);

    let current = class.query("current").unwrap();
    assert!(current.is_monitorable);
    assert!(current.is_list);
    assert_eq!(current.qualified_name(), "org.weather.current");
    assert_eq!(
        current.minimal_projection.as_deref(),
        Some(&["temperature".to_string()][..])
    );
    assert_eq!(
        current.poll_interval,
        Some(Value::Measure(10.0, "min".to_string()))
    );
    assert_eq!(current.out_names(), vec!["temperature", "summary"]);

    let alert = class.action("alert").unwrap();
    assert_eq!(
        alert.arg("message").unwrap().annotations.prompt.as_deref(),
        Some("What should the alert say?")
    );
}

#[test]
fn extends_and_annotations() {
    let class = parse_class(
        r#"class @com.acme.plus extends @com.acme #[version=2] {
  query extra(out data : String);
}"#,
    )
    .unwrap();
    assert_eq!(class.extends, vec!["com.acme".to_string()]);
    assert_eq!(class.annotations.get("version"), Some(&Value::Number(2.0)));
}

#[test]
fn require_either_and_required_if() {
    let class = parse_class(
        r#"class @com.acme {
  query find(in opt name : String, in opt id : String, in opt mode : Enum(fast,slow), in opt depth : Number #[required_if="mode=slow"], out row : String) #[require_either=[["name", "id"]]];
}"#,
    )
    .unwrap();
    let find = class.query("find").unwrap();
    assert_eq!(
        find.require_either,
        vec![vec!["name".to_string(), "id".to_string()]]
    );
    assert_eq!(
        find.arg("depth").unwrap().annotations.required_if.as_deref(),
        Some("mode=slow")
    );
}

#[test]
fn argument_types_parse() {
    let class = parse_class(
        r#"class @com.acme {
  query q(in req a : Entity(tt:contact), in opt b : Array(String), in opt c : Enum(x,y), in opt d : {lat : Number, lon : Number}, out e : Currency);
}"#,
    )
    .unwrap();
    let q = class.query("q").unwrap();
    assert_eq!(q.arg("a").unwrap().ty, Type::Entity("tt:contact".into()));
    assert_eq!(
        q.arg("b").unwrap().ty,
        Type::Array(Box::new(Type::String))
    );
    assert_eq!(
        q.arg("c").unwrap().ty,
        Type::Enum(vec!["x".into(), "y".into()])
    );
    assert!(matches!(q.arg("d").unwrap().ty, Type::Compound(_)));
    assert_eq!(q.arg("e").unwrap().ty, Type::Currency);
}

#[test]
fn class_roundtrips_through_program() {
    let program = parse_ok(WEATHER_CLASS);
    let printed = pretty_print(&program);
    let again = parse_ok(&printed);
    assert_eq!(again, program);
}

#[test]
fn dataset_examples() {
    let input = r#"
dataset @org.weather {
  query := @org.weather.current(location=$?)
  #_[utterances=["the weather", "current conditions"]];
  stream (loc : Location) := monitor @org.weather.current(location=loc);
  action := @org.weather.alert(message=$?);
}
"#;
    let dataset = parse_dataset(input).unwrap();
    assert_eq!(dataset.name, "org.weather");
    assert_eq!(dataset.examples.len(), 3);
    assert_eq!(dataset.examples[0].utterances.len(), 2);
    assert_eq!(dataset.examples[1].kind, DeclarationKind::Stream);
    assert_eq!(dataset.examples[1].params.len(), 1);

    // And through the program printer.
    let program = parse_ok(input);
    let printed = pretty_print(&program);
    assert_eq!(parse_ok(&printed), program);
}
