#![allow(clippy::empty_docs)]
#[derive(Parser)]
#[grammar = "parser/mdl_grammar.pest"] // relative to src
pub struct MdlParser;

use pest::error::{Error, InputLocation};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use std::boxed::Box;

use crate::ast;
use crate::ast::{Ast, AstKind, FormulaOption, StringSpan};
use crate::error::{CompileError, ErrorKind};

fn is_token(pair: &Pair<Rule>) -> bool {
    !matches!(
        pair.as_rule(),
        Rule::kw_if | Rule::kw_in | Rule::kw_where | Rule::EOI
    )
}

fn tokens(pairs: Pairs<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pairs.filter(is_token)
}

//option = @{ ("@" | "!") ~ (^"pv" | ^"over") ~ !ident_char }
fn parse_option(pair: Pair<Rule>) -> FormulaOption {
    if pair.as_str()[1..].eq_ignore_ascii_case("pv") {
        FormulaOption::PriceVolume
    } else {
        FormulaOption::Override
    }
}

fn parse_formula<'a>(pairs: Pairs<'a, Rule>) -> ast::Formula<'a> {
    let mut options = Vec::new();
    let mut body = None;
    let mut condition = None;
    let mut iterators = Vec::new();
    for pair in tokens(pairs) {
        match pair.as_rule() {
            Rule::option => options.push(parse_option(pair)),
            Rule::condition => condition = Some(Box::new(parse_value(pair))),
            Rule::iterator | Rule::iterator_ref => iterators.push(parse_value(pair)),
            _ => body = Some(Box::new(parse_value(pair))),
        }
    }
    ast::Formula {
        options,
        body: body.unwrap(),
        condition,
        iterators,
    }
}

fn parse_value(pair: Pair<'_, Rule>) -> Ast<'_> {
    let span = Some(StringSpan {
        pos_start: pair.as_span().start(),
        pos_end: pair.as_span().end(),
    });
    match pair.as_rule() {
        // instruction = { SOI ~ (iterator | assignment | formula) ~ EOI }
        Rule::instruction => Ast {
            kind: AstKind::Instruction(Box::new(parse_value(
                tokens(pair.into_inner()).next().unwrap(),
            ))),
            span,
        },

        // integer = @{ ASCII_DIGIT+ }, offset = @{ ("-" | "+")? ~ ASCII_DIGIT+ }
        Rule::integer | Rule::offset => Ast {
            kind: match pair.as_str().parse::<i64>() {
                Ok(i) => AstKind::Integer(i),
                Err(_) => AstKind::Real(pair.as_str()),
            },
            span,
        },

        Rule::real => Ast {
            kind: AstKind::Real(pair.as_str()),
            span,
        },

        // zero-padded codes such as `01` keep their text
        Rule::code | Rule::variable_name => Ast {
            kind: AstKind::VariableName(pair.as_str()),
            span,
        },

        Rule::local_name => Ast {
            kind: AstKind::LocalName(pair.as_str()),
            span,
        },

        Rule::loop_counter => Ast {
            kind: AstKind::LoopCounter(&pair.as_str()[1..]),
            span,
        },

        Rule::placeholder => Ast {
            kind: AstKind::Placeholder(Box::new(parse_value(
                pair.into_inner().next().unwrap(),
            ))),
            span,
        },

        Rule::identifier => Ast {
            kind: AstKind::Identifier(ast::Identifier {
                parts: pair.into_inner().map(parse_value).collect(),
                as_value: false,
            }),
            span,
        },

        // index = { "[" ~ expr ~ ("," ~ expr)* ~ "]" }
        Rule::index => Ast {
            kind: AstKind::Index(ast::Index {
                exprs: pair.into_inner().map(parse_value).collect(),
            }),
            span,
        },

        Rule::time_offset => Ast {
            kind: AstKind::TimeOffset(Box::new(parse_value(
                pair.into_inner().next().unwrap(),
            ))),
            span,
        },

        // array = { identifier ~ index ~ time_offset? | identifier ~ &"{" ~ time_offset }
        Rule::array => {
            let mut identifier = None;
            let mut index = None;
            let mut time_offset = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::identifier => identifier = Some(Box::new(parse_value(inner))),
                    Rule::index => index = Some(Box::new(parse_value(inner))),
                    _ => time_offset = Some(Box::new(parse_value(inner))),
                }
            }
            Ast {
                kind: AstKind::Array(ast::Array {
                    identifier: identifier.unwrap(),
                    index,
                    time_offset,
                    as_value: false,
                }),
                span,
            }
        }

        Rule::arith_op | Rule::unary_op => Ast {
            kind: AstKind::Operator(pair.as_str()),
            span,
        },
        Rule::comparison_op => Ast {
            kind: AstKind::ComparisonOperator(pair.as_str()),
            span,
        },
        Rule::boolean_op => Ast {
            kind: AstKind::BooleanOperator(pair.as_str()),
            span,
        },

        // expr = { unary_op? ~ atom ~ (binary_op ~ atom)* }
        Rule::expr => Ast {
            kind: AstKind::Expr(ast::Expr {
                terms: pair.into_inner().map(parse_value).collect(),
            }),
            span,
        },

        // function = { function_name ~ "(" ~ (nested_formula ~ &")" | expr ~ ("," ~ expr)*)? ~ ")" }
        Rule::function => {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str();
            let kind = match inner.peek().map(|p| p.as_rule()) {
                Some(Rule::nested_formula) => AstKind::FormulaFunction(ast::FormulaFunction {
                    name,
                    formula: Box::new(parse_value(inner.next().unwrap())),
                }),
                // a plain `sum(x)` is a nested formula without its own iterators
                Some(Rule::expr) if name == "sum" && inner.clone().count() == 1 => {
                    let body = parse_value(inner.next().unwrap());
                    let body_span = body.span;
                    AstKind::FormulaFunction(ast::FormulaFunction {
                        name,
                        formula: Box::new(Ast {
                            kind: AstKind::Formula(ast::Formula {
                                options: vec![],
                                body: Box::new(body),
                                condition: None,
                                iterators: vec![],
                            }),
                            span: body_span,
                        }),
                    })
                }
                _ => AstKind::Function(ast::Function {
                    name,
                    args: inner.map(parse_value).collect(),
                }),
            };
            Ast { kind, span }
        }

        // condition = { kw_if ~ expr }
        Rule::condition => Ast {
            kind: AstKind::Condition(Box::new(parse_value(
                tokens(pair.into_inner()).next().unwrap(),
            ))),
            span,
        },

        // equation = { expr ~ "=" ~ expr }
        Rule::equation => {
            let mut inner = pair.into_inner();
            Ast {
                kind: AstKind::Equation(ast::Equation {
                    lhs: Box::new(parse_value(inner.next().unwrap())),
                    rhs: Box::new(parse_value(inner.next().unwrap())),
                }),
                span,
            }
        }

        Rule::list_base => Ast {
            kind: AstKind::ListBase(pair.into_inner().map(|p| p.as_str()).collect()),
            span,
        },

        // list = { (list_base | local_name) ~ ("\\" ~ (list_base | local_name))? }
        Rule::list => {
            let mut inner = pair.into_inner();
            Ast {
                kind: AstKind::List(ast::List {
                    base: Box::new(parse_value(inner.next().unwrap())),
                    exclusion: inner.next().map(parse_value).map(Box::new),
                }),
                span,
            }
        }

        // iterator = { name_group ~ kw_in ~ list_group }
        Rule::iterator => {
            let mut names = Vec::new();
            let mut lists = Vec::new();
            for inner in tokens(pair.into_inner()) {
                match inner.as_rule() {
                    Rule::variable_name => names.push(inner.as_str()),
                    _ => lists.push(parse_value(inner)),
                }
            }
            Ast {
                kind: AstKind::Iterator(ast::Iter {
                    names,
                    lists: Some(lists),
                }),
                span,
            }
        }

        Rule::iterator_ref => Ast {
            kind: AstKind::Iterator(ast::Iter {
                names: vec![pair.into_inner().next().unwrap().as_str()],
                lists: None,
            }),
            span,
        },

        Rule::formula | Rule::nested_formula => Ast {
            kind: AstKind::Formula(parse_formula(pair.into_inner())),
            span,
        },

        // assignment = { local_group ~ ":=" ~ list_group }
        Rule::assignment => {
            let mut names = Vec::new();
            let mut lists = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::local_name => names.push(inner.as_str()),
                    _ => lists.push(parse_value(inner)),
                }
            }
            Ast {
                kind: AstKind::Assignment(ast::Assignment { names, lists }),
                span,
            }
        }

        _ => unreachable!("unexpected rule {:?}", pair.as_rule()),
    }
}

fn syntax_error(err: Error<Rule>) -> CompileError {
    let span = match err.location {
        InputLocation::Pos(pos) => StringSpan {
            pos_start: pos,
            pos_end: pos,
        },
        InputLocation::Span((start, end)) => StringSpan {
            pos_start: start,
            pos_end: end,
        },
    };
    let message = err.variant.message().to_string();
    CompileError::new(ErrorKind::Syntax(message), Some(span))
}

/// Parses one logical statement into an `Instruction` node.
pub fn parse_instruction(text: &str) -> Result<Ast<'_>, CompileError> {
    let instruction = MdlParser::parse(Rule::instruction, text)
        .map_err(syntax_error)?
        .next()
        .unwrap();
    Ok(parse_value(instruction))
}

/// Parses `text` as a single grammar production, which must span all of it.
pub fn parse_fragment(rule: Rule, text: &str) -> Result<Ast<'_>, Box<Error<Rule>>> {
    let pair = MdlParser::parse(rule, text)?.next().unwrap();
    if pair.as_span().end() != text.len() {
        return Err(Box::new(Error::new_from_pos(
            pest::error::ErrorVariant::CustomError {
                message: "unconsumed input".to_string(),
            },
            pair.as_span().end_pos(),
        )));
    }
    Ok(parse_value(pair))
}

#[cfg(test)]
mod tests {
    use super::{parse_fragment, parse_instruction, Rule};
    use crate::ast::{AstKind, FormulaOption, NodeKind};
    use crate::error::ErrorKind;

    fn formula(text: &str) -> crate::ast::Formula<'_> {
        let ast = parse_instruction(text).unwrap();
        match ast.kind {
            AstKind::Instruction(inner) => match inner.kind {
                AstKind::Formula(f) => f,
                other => panic!("expected formula, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn equation_with_iterators() {
        let f = formula("Q[c] = Test[$c] + 2 * $c, c in 04 05 06");
        assert!(f.options.is_empty());
        assert!(f.condition.is_none());
        assert_eq!(f.body.node_kind(), NodeKind::Equation);
        assert_eq!(f.iterators.len(), 1);
        let iter = f.iterators[0].kind.as_iterator().unwrap();
        assert_eq!(iter.names, vec!["c"]);
        let list = iter.lists.as_ref().unwrap()[0].kind.as_list().unwrap();
        assert_eq!(list.base.kind, AstKind::ListBase(vec!["04", "05", "06"]));
        assert_eq!(f.body.to_string(), "Q[c] = Test[$c] + 2 * $c");
    }

    #[test]
    fn options_and_condition() {
        let f = formula("@pv !OVER PM[c] = PWD[c] * TC if PWD[c] <> 0, c in 01 02");
        assert_eq!(
            f.options,
            vec![FormulaOption::PriceVolume, FormulaOption::Override]
        );
        assert_eq!(
            f.condition.as_ref().unwrap().to_string(),
            "if PWD[c] <> 0"
        );
    }

    #[test]
    fn parallel_iterator_and_exclusion() {
        let ast = parse_fragment(Rule::iterator, "(c, s) in (01 02 03, 04 05 06)").unwrap();
        let iter = ast.kind.as_iterator().unwrap();
        assert!(iter.is_parallel());
        assert_eq!(iter.lists.as_ref().unwrap().len(), 2);

        let ast = parse_fragment(Rule::iterator, "c in 01 02 03 04 \\ 02 04").unwrap();
        let iter = ast.kind.as_iterator().unwrap();
        let list = iter.lists.as_ref().unwrap()[0].kind.as_list().unwrap();
        assert_eq!(list.exclusion.as_ref().unwrap().node_kind(), NodeKind::ListBase);
    }

    #[test]
    fn exclusion_by_local() {
        let ast = parse_fragment(Rule::iterator, "c in %all \\ %energy").unwrap();
        let iter = ast.kind.as_iterator().unwrap();
        let list = iter.lists.as_ref().unwrap()[0].kind.as_list().unwrap();
        assert_eq!(list.base.kind, AstKind::LocalName("%all"));
        assert_eq!(list.exclusion.as_ref().unwrap().kind, AstKind::LocalName("%energy"));
    }

    #[test]
    fn placeholders_in_identifiers() {
        let ast = parse_fragment(Rule::expr, "test|V|_energy|%o|[c]").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        let array = terms[0].kind.as_array().unwrap();
        let id = array.identifier.kind.as_identifier().unwrap();
        let kinds = id.parts.iter().map(|p| p.node_kind()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                NodeKind::VariableName,
                NodeKind::Placeholder,
                NodeKind::VariableName,
                NodeKind::Placeholder
            ]
        );
    }

    #[test]
    fn time_offsets() {
        let ast = parse_fragment(Rule::expr, "K[s](-1) + X{-2} + Y[c]{t}").unwrap();
        assert_eq!(ast.to_string(), "K[s](-1) + X(-2) + Y[c](t)");
    }

    #[test]
    fn sum_prefers_nested_formula() {
        let ast = parse_fragment(Rule::expr, "sum(Q[c, s] if Q[c, s] <> 0, c in 01 02 03)").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        let func = terms[0].kind.as_formula_function().unwrap();
        assert_eq!(func.name, "sum");
        let nested = func.formula.kind.as_formula().unwrap();
        assert!(nested.condition.is_some());
        assert_eq!(nested.iterators.len(), 1);
    }

    #[test]
    fn plain_arguments_fall_back_to_expression_list() {
        let ast = parse_fragment(Rule::expr, "max(a, b, c)").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        let func = terms[0].kind.as_function().unwrap();
        assert_eq!(func.args.len(), 3);
    }

    #[test]
    fn plain_sum_is_a_formula_function() {
        let ast = parse_fragment(Rule::expr, "sum(X[c])").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        assert_eq!(terms[0].node_kind(), NodeKind::FormulaFunction);
    }

    #[test]
    fn where_clause_with_ambient_reference() {
        let ast = parse_fragment(Rule::expr, "sum(TCO_VAL[ce2, s] where s, ce2 in 01 02)").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        let func = terms[0].kind.as_formula_function().unwrap();
        let nested = func.formula.kind.as_formula().unwrap();
        assert!(nested.iterators[0].kind.as_iterator().unwrap().lists.is_none());
        assert!(nested.iterators[1].kind.as_iterator().unwrap().lists.is_some());
    }

    #[test]
    fn assignments() {
        let ast = parse_fragment(Rule::assignment, "(%a, %b) := (1 2 3, 15 12 3)").unwrap();
        match ast.kind {
            AstKind::Assignment(a) => {
                assert_eq!(a.names, vec!["%a", "%b"]);
                assert_eq!(a.lists.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn eviews_names_and_operators() {
        let ast = parse_fragment(Rule::expr, "@elem(PK[s](-1), @year) =< 2006 and x => 1").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        assert_eq!(terms[0].kind.as_function().unwrap().name, "@elem");
        assert_eq!(terms[1].kind, AstKind::ComparisonOperator("=<"));
        assert_eq!(terms[3].kind, AstKind::BooleanOperator("and"));
    }

    #[test]
    fn operators_stay_flat() {
        let ast = parse_fragment(Rule::expr, "-a + b * c ^ 2").unwrap();
        let terms = &ast.kind.as_expr().unwrap().terms;
        assert_eq!(terms.len(), 8);
        assert_eq!(terms[0].kind, AstKind::Operator("-"));
    }

    #[test]
    fn zero_padded_codes_keep_their_text() {
        let ast = parse_fragment(Rule::expr, "X[01, c] + 1.5").unwrap();
        assert_eq!(ast.to_string(), "X[01, c] + 1.5");
    }

    #[test]
    fn keywords_are_not_variables() {
        assert!(parse_fragment(Rule::variable_name, "in").is_err());
        assert!(parse_fragment(Rule::variable_name, "index").is_ok());
    }

    #[test]
    fn syntax_error_is_located() {
        let err = parse_instruction("Q[c = 1").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Syntax(_)));
        assert!(err.span().is_some());
    }
}
