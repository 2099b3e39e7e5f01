use super::*;

use std::path::PathBuf;
use test_log::test;

pub const TEST_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/data");

pub const SPICE_DIVIDER: &str = r#"* divider
.subckt divider top bot out
+ params: ratio=0.5
R1 top out {10k*ratio}
R2 out bot 10k
.ends divider
X1 vdd 0 mid divider ratio=0.25
.end
"#;

#[inline]
pub fn test_data(file_name: &str) -> PathBuf {
    PathBuf::from(TEST_DATA_DIR).join(file_name)
}

fn words(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Word(w) => Some(w.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn tokenize_groups_and_comments() {
    let toks = tokenize(
        "R1 a b {x * 2} tc = (1, 2) $ trailing note",
        &Dialect::Spice.inline_comments(),
    )
    .unwrap();
    assert_eq!(
        toks,
        vec![
            Token::Word("R1".into()),
            Token::Word("a".into()),
            Token::Word("b".into()),
            Token::Word("{x * 2}".into()),
            Token::Word("tc".into()),
            Token::Equals,
            Token::Word("(1, 2)".into()),
            Token::Comment("$ trailing note".into()),
        ]
    );
}

#[test]
fn braces_only_nest_braces() {
    let toks = tokenize(".param I2={freq*(10/5.0})", &Dialect::Spice.inline_comments()).unwrap();
    assert_eq!(words(&toks), vec![".param", "I2", "{freq*(10/5.0})"]);
}

#[test]
fn comment_leader_inside_word_is_not_a_comment() {
    let toks = tokenize("V1 a$b 0 1", &Dialect::Spice.inline_comments()).unwrap();
    assert_eq!(words(&toks), vec!["V1", "a$b", "0", "1"]);

    let toks = tokenize("V1 a 0 {x $ y}", &Dialect::Spice.inline_comments()).unwrap();
    assert_eq!(words(&toks), vec!["V1", "a", "0", "{x $ y}"]);
}

#[test]
fn unterminated_group_is_an_error() {
    let err = tokenize("R1 a b {x*2", &Dialect::Spice.inline_comments()).unwrap_err();
    assert_eq!(err.ofs, 7);
    assert!(err.to_string().contains("unterminated `{`"));
}

#[test]
fn continuation_lines_fold_into_one_logical_line() {
    let lines = Tokenizer::new(Dialect::Spice, SPICE_DIVIDER).collect::<Vec<_>>();
    assert_eq!(lines.len(), 7);

    let header = &lines[1];
    assert_eq!(header.segments().len(), 2);
    assert_eq!(header.span(), 1..3);
    assert_eq!(header.line_no(), 2);
    assert_eq!(header.content(), ".subckt divider top bot out params: ratio=0.5");
    assert_eq!(
        header.raw(),
        ".subckt divider top bot out\n+ params: ratio=0.5\n"
    );
    assert_eq!(header.eol(), "\n");

    let raw: String = lines.iter().map(Line::raw).collect();
    assert_eq!(raw, SPICE_DIVIDER);
}

#[test]
fn comments_do_not_absorb_continuations() {
    let lines = Tokenizer::new(Dialect::Spice, "* note\n+ stray\n").collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    let comments = Dialect::Spice.line_comments();
    assert_eq!(lines[0].kind(&comments), LineKind::Comment);
    assert_eq!(lines[1].kind(&comments), LineKind::Continuation);
}

#[test]
fn inline_comments_end_at_their_physical_line() {
    let deck = "R1 a b 1k ; note\n+ tc=1 ; more\n.model D1 D (IS=1e-14 ; sat\n+ RS=0.5)\n.end\n";
    let parsed = Parser::parse(Dialect::LtSpice, deck);
    assert!(parsed.warnings.is_empty());

    let inst = parsed.statements[0].as_instance().unwrap();
    assert_eq!(inst.value, "1k");
    assert_eq!(
        inst.args,
        vec![Arg::Param {
            name: "tc".into(),
            value: "1".into()
        }]
    );
    assert_eq!(inst.comment.as_deref(), Some("; note ; more"));

    // A leader inside an open group is not a comment.
    let model = parsed.statements[1].as_directive().unwrap();
    assert_eq!(model.args.last().unwrap().to_string(), "(IS=1e-14 ; sat RS=0.5)");
    assert_eq!(model.comment, None);

    let spice = Parser::parse(Dialect::Spice, "C1 a b 1p $ trim\n+ ic=0\n");
    let inst = spice.statements[0].as_instance().unwrap();
    assert_eq!(inst.params().count(), 1);
    assert_eq!(inst.comment.as_deref(), Some("$ trim"));
}

#[test]
fn tokenizer_is_restartable() {
    let mut tok = Tokenizer::new(Dialect::Spice, SPICE_DIVIDER);
    let first = tok.clone().collect::<Vec<_>>();
    let drained = tok.by_ref().collect::<Vec<_>>();
    assert!(tok.next().is_none());
    tok.restart();
    let again = tok.collect::<Vec<_>>();
    assert_eq!(first, drained);
    assert_eq!(first, again);
}

#[test]
fn line_terminators_are_kept_per_line() {
    let deck = "* mixed\r\nR1 a b 1k\nR2 b c 2k";
    let lines = Tokenizer::new(Dialect::Spice, deck).collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].eol(), "\r\n");
    assert_eq!(lines[1].eol(), "\n");
    assert_eq!(lines[2].eol(), "");
    assert_eq!(detect_eol(deck), "\r\n");
    assert_eq!(detect_eol("R1 a b 1k"), "\n");
}

#[test]
fn dialect_selects_comment_leaders() {
    let deck = "; ltspice comment\nR1 a b 1k ; inline\n";
    let lt = Parser::parse(Dialect::LtSpice, deck);
    assert!(lt.warnings.is_empty());
    assert!(matches!(lt.statements[0].kind(), StatementKind::Comment(_)));
    let r1 = lt.statements[1].as_instance().unwrap();
    assert_eq!(r1.value, "1k");
    assert_eq!(r1.comment.as_deref(), Some("; inline"));

    let spice = Parser::parse(Dialect::Spice, deck);
    assert_eq!(spice.warnings.len(), 1);
    assert_eq!(spice.warnings[0].line, 1);
}

#[test]
fn parse_dialect_names() {
    assert_eq!("spice".parse::<Dialect>().unwrap(), Dialect::Spice);
    assert_eq!("LTspice".parse::<Dialect>().unwrap(), Dialect::LtSpice);
    assert_eq!("lt".parse::<Dialect>().unwrap(), Dialect::LtSpice);
    assert!("hspice".parse::<Dialect>().is_err());
    assert_eq!(Dialect::default().to_string(), "spice");
}

#[test]
fn instance_layout_by_prefix() {
    let deck = "\
E1 out 0 inp inn 100k
E2 out 0 value={v(a)*2}
M1 d g s nch W=1u L=100n
M2 d g s b nch W=1u
V1 in 0 AC 1 SIN(0 1 1k)
X1 a b c sub params: k=2
";
    let parsed = Parser::parse(Dialect::Spice, deck);
    assert!(parsed.warnings.is_empty());
    let insts: Vec<&Instance> = parsed
        .statements
        .iter()
        .filter_map(Statement::as_instance)
        .collect();

    assert_eq!(insts[0].nodes.len(), 4);
    assert_eq!(insts[0].value, "100k");

    assert_eq!(insts[1].nodes.len(), 2);
    assert_eq!(insts[1].value, "value={v(a)*2}");

    assert_eq!(insts[2].nodes.len(), 3);
    assert_eq!(insts[2].value, "nch");
    assert_eq!(insts[2].params().count(), 2);

    assert_eq!(insts[3].nodes.len(), 4);
    assert_eq!(insts[3].value, "nch");

    assert_eq!(insts[4].nodes.len(), 2);
    assert_eq!(insts[4].value, "AC 1 SIN(0 1 1k)");

    assert_eq!(insts[5].nodes, vec!["a", "b", "c"]);
    assert_eq!(insts[5].value, "sub");
    assert!(insts[5].is_subckt_ref());
    assert_eq!(
        insts[5].params().collect::<Vec<_>>(),
        vec![(&ArcStr::from("k"), &ArcStr::from("2"))]
    );
}

#[test]
fn parse_param_forms() {
    let deck = ".param a=1 b = {a*2}\n.PARAMS c 3\n";
    let parsed = Parser::parse(Dialect::Spice, deck);
    assert!(parsed.warnings.is_empty());
    let first = parsed.statements[0].as_param().unwrap();
    assert_eq!(first.get("a").map(ArcStr::as_str), Some("1"));
    assert_eq!(first.get("B").map(ArcStr::as_str), Some("{a*2}"));
    let second = parsed.statements[1].as_param().unwrap();
    assert_eq!(second.keyword, ".PARAMS");
    assert_eq!(second.get("c").map(ArcStr::as_str), Some("3"));
}

#[test]
fn parse_nested_subcircuits() {
    let parsed = Parser::parse(Dialect::Spice, SPICE_DIVIDER);
    assert!(parsed.warnings.is_empty());
    assert_eq!(parsed.statements.len(), 4);

    let divider = parsed.statements[1].as_subckt().unwrap();
    assert_eq!(divider.name(), "divider");
    assert_eq!(divider.ports(), ["top", "bot", "out"]);
    assert_eq!(divider.param("RATIO").map(ArcStr::as_str), Some("0.5"));
    assert_eq!(divider.body().len(), 2);
    assert!(divider.is_terminated());
    assert!(!divider.is_modified());
    assert!(divider.clone_of().is_none());

    let x1 = parsed.statements[2].as_instance().unwrap();
    assert_eq!(x1.value, "divider");
}

#[test]
fn parse_filter_deck() {
    let deck = std::fs::read_to_string(test_data("spice/filter.net")).unwrap();
    let parsed = Parser::parse(Dialect::Spice, deck.as_str());
    assert!(parsed.warnings.is_empty());
    assert_eq!(parsed.eol, "\n");

    let subckts: Vec<&Subckt> = parsed
        .statements
        .iter()
        .filter_map(Statement::as_subckt)
        .collect();
    assert_eq!(subckts.len(), 2);
    assert_eq!(subckts[0].name(), "OPA2333P_MC");
    assert_eq!(subckts[0].param("tol").map(ArcStr::as_str), Some("0.01"));
    let xdut = subckts[0].body()[0].as_instance().unwrap();
    assert_eq!(xdut.designator, "XDUT");
    assert_eq!(xdut.value, "OPA2333P");
    assert_eq!(subckts[1].name(), "OPA2333P");

    let directives: Vec<String> = parsed
        .statements
        .iter()
        .filter_map(Statement::keyword)
        .collect();
    assert_eq!(
        directives,
        vec![".param", ".param", ".ac", ".backanno", ".end"]
    );
}

#[test]
fn malformed_lines_degrade_to_comments() {
    let deck = std::fs::read_to_string(test_data("spice/messy.net")).unwrap();
    let parsed = Parser::parse(Dialect::Spice, deck.as_str());

    let lines: Vec<usize> = parsed.warnings.iter().map(|w| w.line).collect();
    assert_eq!(lines, vec![3, 6, 7, 9, 10]);
    assert!(parsed.warnings[1].reason.contains("Q1"));
    assert!(parsed.warnings[2].reason.contains("unrecognized element type"));

    let model = parsed.statements[3].as_directive().unwrap();
    assert_eq!(model.keyword, ".model");
    assert_eq!(model.args.len(), 3);

    let open = parsed.statements.last().and_then(Statement::as_subckt).unwrap();
    assert_eq!(open.name(), "OPEN");
    assert!(!open.is_terminated());
    assert_eq!(open.body().len(), 1);
}

#[test]
fn parse_single_statements() {
    let kind = parse_statement(Dialect::Spice, ".tran 1m").unwrap();
    assert!(matches!(kind, StatementKind::Directive(_)));
    let kind = parse_statement(Dialect::Spice, "C9 a 0 10p").unwrap();
    assert!(matches!(kind, StatementKind::Instance(_)));
    assert!(parse_statement(Dialect::Spice, ".subckt foo a b").is_err());
    assert!(parse_statement(Dialect::Spice, "R1 a b 1k\nR2 b c 1k").is_err());
}

#[test]
fn clone_markers_fold_into_subcircuits() {
    let deck = "\
.subckt amp a b
R1 a b 1k
.ends amp
*** [spice-editor] begin clone amp_X1 of amp for X1
.subckt amp_X1 a b
R1 a b 2k
.ends amp_X1
*** [spice-editor] end clone amp_X1
X1 n1 n2 amp_X1
";
    let parsed = Parser::parse(Dialect::Spice, deck);
    assert!(parsed.warnings.is_empty());
    assert_eq!(parsed.statements.len(), 3);
    let clone = parsed.statements[1].as_subckt().unwrap();
    let origin = clone.clone_of().unwrap();
    assert_eq!(origin.origin, "amp");
    assert_eq!(origin.path.to_string(), "X1");
    assert!(clone.begin_marker().is_some());
    assert!(clone.end_marker().is_some());
}

#[test]
fn stray_markers_stay_comments() {
    let deck = "\
*** [spice-editor] begin clone amp_X1 of amp for X1
R1 a b 1k
*** [spice-editor] end clone amp_X1
";
    let parsed = Parser::parse(Dialect::Spice, deck);
    assert_eq!(parsed.statements.len(), 3);
    assert!(matches!(parsed.statements[0].kind(), StatementKind::Comment(_)));
    assert!(matches!(parsed.statements[2].kind(), StatementKind::Comment(_)));
}
