use teleproto_tl_parser::errors::{ParamParseError, ParseError};
use teleproto_tl_parser::tl::{Category, ParameterType};
use teleproto_tl_parser::{parse_tl_file, parse_tl_file_with_lines};

#[test]
fn constructor_with_explicit_id() {
    let defs: Vec<_> = parse_tl_file("pong#347773c5 msg_id:long ping_id:long = Pong;")
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "pong");
    assert_eq!(defs[0].id, 0x347773c5);
    assert_eq!(defs[0].params.len(), 2);
    assert_eq!(defs[0].ty.name, "Pong");
    assert_eq!(defs[0].category, Category::Types);
}

#[test]
fn sections_switch_category() {
    let src = "
boolTrue#997275b5 = Bool;
---functions---
help.getConfig#c4f9186b = Config;
---types---
boolFalse#bc799737 = Bool;
";
    let defs: Vec<_> = parse_tl_file(src).collect::<Result<_, _>>().unwrap();
    let cats: Vec<_> = defs.iter().map(|d| d.category).collect();
    assert_eq!(cats, [Category::Types, Category::Functions, Category::Types]);
    assert_eq!(defs[1].namespace, ["help"]);
    assert_eq!(defs[1].full_name(), "help.getConfig");
}

#[test]
fn conditional_parameters() {
    let src = "user#2e13f4c3 flags:# self:flags.10?true id:int username:flags.3?string = User;";
    let def = parse_tl_file(src).next().unwrap().unwrap();
    assert_eq!(def.params[0].ty, ParameterType::Flags);
    match &def.params[1].ty {
        ParameterType::Normal { ty, flag: Some(flag) } => {
            assert_eq!(ty.name, "true");
            assert_eq!(flag.index, 10);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn undeclared_flags_field_is_rejected() {
    let src = "user#1 id:int name:flags.0?string = User;";
    let err = parse_tl_file(src).next().unwrap().unwrap_err();
    assert_eq!(err, ParseError::InvalidParam(ParamParseError::UnknownDef));
}

#[test]
fn generic_wrapper() {
    let src = "---functions---\ninvokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X;";
    let def = parse_tl_file(src).next().unwrap().unwrap();
    assert_eq!(def.params.len(), 2);
    assert!(def.ty.generic_ref);
    assert_eq!(def.to_string(), "invokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X");
}

#[test]
fn multi_line_and_trailing_comments() {
    let src = "
// header
msgs_ack#62d6b459
    msg_ids:Vector<long>   // acked ids
    = MsgsAck;

pong#347773c5 msg_id:long ping_id:long = Pong;
";
    let items: Vec<_> = parse_tl_file_with_lines(src).collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].0, 3);
    assert_eq!(items[1].0, 7);
    let ack = items[0].1.as_ref().unwrap();
    assert_eq!(ack.id, 0x62d6b459);
    assert_eq!(ack.params[0].to_string(), "msg_ids:Vector<long>");
}

#[test]
fn derived_id_matches_explicit() {
    let defs: Vec<_> = parse_tl_file("boolFalse = Bool;").collect::<Result<_, _>>().unwrap();
    assert_eq!(defs[0].id, 0xbc799737);
}

#[test]
fn bad_input() {
    let mut it = parse_tl_file("foo#zz = Bar;\nfoo#1 a:int;\n= Bar;\nvector#1cb5c415 {t:Type} # [ t ] = Vector t;");
    assert!(matches!(it.next(), Some(Err(ParseError::InvalidId(_)))));
    assert!(matches!(it.next(), Some(Err(ParseError::MissingType))));
    assert!(matches!(it.next(), Some(Err(ParseError::MissingName))));
    assert!(matches!(it.next(), Some(Err(ParseError::Unsupported))));
    assert!(it.next().is_none());
}
