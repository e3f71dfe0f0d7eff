//! End-to-end operator scenarios over row values, mirroring how the
//! column layer evaluates calculated expressions.

use jet_expr::{ops, DbEvalContext, EvalError, Value, FALSE_VAL, TRUE_VAL};
use pretty_assertions::assert_eq;

fn ctx() -> DbEvalContext {
    DbEvalContext::new()
}

#[test]
fn concat_of_id_and_data_renders_row_text() {
    // [id] & "_" & [data] with id=1, data="foo" -> "1_foo"
    let id = Value::Long(1);
    let data = Value::from("foo");
    let left = ops::concat(&id, &Value::from("_")).unwrap();
    let result = ops::concat(&left, &data).unwrap();
    assert_eq!(result, Value::Text("1_foo".into()));
}

#[test]
fn long_addition() {
    // [id] + 1
    let ctx = ctx();
    assert_eq!(
        ops::add(&ctx, &Value::Long(1), &Value::Long(1)).unwrap(),
        Value::Long(2)
    );
    assert_eq!(
        ops::add(&ctx, &Value::Long(-38), &Value::Long(1)).unwrap(),
        Value::Long(-37)
    );
}

#[test]
fn decimal_division_of_id() {
    // [id] / 0.03 with id=1
    let result = ops::divide(&Value::Long(1), &Value::BigDec("0.03".parse().unwrap())).unwrap();
    assert_eq!(
        result.as_string().unwrap(),
        "33.3333333333333333333333333333"
    );
}

#[test]
fn comparison_of_id_with_zero() {
    // [id] > 0
    assert_eq!(
        ops::greater_than(&Value::Long(2), &Value::Long(0)).unwrap(),
        TRUE_VAL
    );
    assert_eq!(
        ops::greater_than(&Value::Long(-37), &Value::Long(0)).unwrap(),
        FALSE_VAL
    );
}

#[test]
fn string_to_number_coercion_against_concat() {
    let ctx = ctx();
    assert_eq!(
        ops::add(&ctx, &Value::from("5"), &Value::Long(3)).unwrap(),
        Value::Long(8)
    );
    assert_eq!(
        ops::concat(&Value::from("5"), &Value::Long(3)).unwrap(),
        Value::Text("53".into())
    );
}

#[test]
fn division_by_zero_raises_arithmetic() {
    assert!(matches!(
        ops::divide(&Value::Long(1), &Value::Long(0)),
        Err(EvalError::Arithmetic(_))
    ));
    assert!(matches!(
        ops::divide(&Value::Double(1.0), &Value::Double(0.0)),
        Err(EvalError::Arithmetic(_))
    ));
}

#[test]
fn every_plain_binary_operator_propagates_null() {
    let ctx = ctx();
    let v = Value::Long(7);
    type BinOp = fn(&DbEvalContext, &Value, &Value) -> jet_expr::Result<Value>;
    let ops_with_ctx: &[BinOp] = &[
        |c, a, b| ops::add(c, a, b),
        |c, a, b| ops::subtract(c, a, b),
    ];
    for op in ops_with_ctx {
        assert!(op(&ctx, &Value::Null, &v).unwrap().is_null());
        assert!(op(&ctx, &v, &Value::Null).unwrap().is_null());
    }
    type PlainOp = fn(&Value, &Value) -> jet_expr::Result<Value>;
    let plain: &[PlainOp] = &[
        ops::multiply,
        ops::divide,
        ops::int_divide,
        ops::modulo,
        ops::exp,
        ops::equals,
        ops::not_equals,
        ops::less_than,
        ops::less_than_eq,
        ops::greater_than,
        ops::greater_than_eq,
        ops::eqv,
        ops::xor,
    ];
    for op in plain {
        assert!(op(&Value::Null, &v).unwrap().is_null());
        assert!(op(&v, &Value::Null).unwrap().is_null());
    }
}
