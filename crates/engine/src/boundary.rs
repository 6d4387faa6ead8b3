//! Host call surface
//!
//! An embedding runtime calls into zones by function name with a list of
//! dynamically typed arguments and gets back either a value or a
//! `(false|nil, message)` pair:
//!
//! | Call | Success | Reported failure |
//! |------|---------|------------------|
//! | `insert(zone, key, value, order)` | `True` | `False(msg)` |
//! | `get(zone, key, order)` | `Value(v)` | `Nil(msg)` |
//! | `get(zone, key, field, order)` | `Value(v)` | `Nil(msg)` |
//! | `delete(zone, key, order)` | `True` | `False(msg)` |
//!
//! Host values arrive as JSON and are type-dispatched into [`Value`]:
//! objects become tables with string keys, arrays become tables keyed
//! `1..=n`, and `null` is rejected. Malformed calls and unsupported values
//! are errors; everything the zone reports (missing key, existing key, no
//! memory, ...) is a reply.

use serde_json::Value as Json;
use shmtree_core::{Comparator, Error, Result, Table, Value};
use tracing::trace;

use crate::zone::Zone;

/// One argument of a host call
pub enum HostArg<'a> {
    /// A zone handle
    Zone(&'a Zone),
    /// A key, value or field name
    Value(Json),
    /// The ordering function for this call
    Order(&'a mut dyn Comparator),
}

impl HostArg<'_> {
    fn kind(&self) -> &'static str {
        match self {
            HostArg::Zone(_) => "zone",
            HostArg::Value(_) => "value",
            HostArg::Order(_) => "comparator",
        }
    }
}

impl std::fmt::Debug for HostArg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostArg::Zone(z) => f.debug_tuple("Zone").field(&z.name()).finish(),
            HostArg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HostArg::Order(_) => f.write_str("Order(..)"),
        }
    }
}

/// Result of a host call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The operation succeeded and has nothing to return
    True,
    /// The requested value
    Value(Value),
    /// A mutation was refused
    False(&'static str),
    /// A lookup found nothing
    Nil(&'static str),
}

/// Dispatch a host call by function name
///
/// # Errors
///
/// `BadArgument` for an unknown function, wrong arity or a wrong argument
/// kind; `BadValueType` for a value with no stored representation; any
/// fatal zone error.
pub fn call(function: &str, args: Vec<HostArg<'_>>) -> Result<Reply> {
    trace!(function, args = args.len(), "host call");
    match function {
        "insert" => {
            let [zone, key, value, order] = arity::<4>(function, args)?;
            let zone = zone_arg(function, 1, zone)?;
            let key = value_arg(function, 2, key)?;
            let value = value_arg(function, 3, value)?;
            let order = order_arg(function, 4, order)?;
            reply(zone.insert(&key, &value, order), |()| Reply::True, Reply::False)
        }
        "get" if args.len() == 4 => {
            let [zone, key, field, order] = arity::<4>(function, args)?;
            let zone = zone_arg(function, 1, zone)?;
            let key = value_arg(function, 2, key)?;
            let field = value_arg(function, 3, field)?;
            let order = order_arg(function, 4, order)?;
            reply(zone.get_field(&key, &field, order), Reply::Value, Reply::Nil)
        }
        "get" => {
            let [zone, key, order] = arity::<3>(function, args)
                .map_err(|_| Error::bad_argument(0, function, "expected 3 or 4 arguments"))?;
            let zone = zone_arg(function, 1, zone)?;
            let key = value_arg(function, 2, key)?;
            let order = order_arg(function, 3, order)?;
            reply(zone.get(&key, order), Reply::Value, Reply::Nil)
        }
        "delete" => {
            let [zone, key, order] = arity::<3>(function, args)?;
            let zone = zone_arg(function, 1, zone)?;
            let key = value_arg(function, 2, key)?;
            let order = order_arg(function, 3, order)?;
            reply(zone.delete(&key, order), |()| Reply::True, Reply::False)
        }
        _ => Err(Error::bad_argument(0, function, "unknown function")),
    }
}

fn arity<'a, const N: usize>(function: &str, args: Vec<HostArg<'a>>) -> Result<[HostArg<'a>; N]> {
    <[HostArg<'a>; N]>::try_from(args).map_err(|_| {
        let noun = if N == 1 { "argument" } else { "arguments" };
        Error::bad_argument(0, function, format!("expected {N} {noun}"))
    })
}

fn zone_arg<'a>(function: &str, position: usize, arg: HostArg<'a>) -> Result<&'a Zone> {
    match arg {
        HostArg::Zone(zone) => Ok(zone),
        other => Err(wrong_kind(function, position, "zone", &other)),
    }
}

fn value_arg(function: &str, position: usize, arg: HostArg<'_>) -> Result<Value> {
    match arg {
        HostArg::Value(json) => from_json(&json),
        other => Err(wrong_kind(function, position, "value", &other)),
    }
}

fn order_arg<'a>(
    function: &str,
    position: usize,
    arg: HostArg<'a>,
) -> Result<&'a mut dyn Comparator> {
    match arg {
        HostArg::Order(order) => Ok(order),
        other => Err(wrong_kind(function, position, "comparator", &other)),
    }
}

fn wrong_kind(function: &str, position: usize, expected: &str, got: &HostArg<'_>) -> Error {
    Error::bad_argument(
        position,
        function,
        format!("expected {expected}, got {}", got.kind()),
    )
}

/// Turn reported errors into replies, pass fatal ones through
fn reply<T>(
    result: Result<T>,
    ok: impl FnOnce(T) -> Reply,
    refused: fn(&'static str) -> Reply,
) -> Result<Reply> {
    match result {
        Ok(value) => Ok(ok(value)),
        Err(e) => match e.reply_message() {
            Some(message) => {
                trace!(error = %e, "host call refused");
                Ok(refused(message))
            }
            None => Err(e),
        },
    }
}

/// Convert a host value into a storable [`Value`]
///
/// # Errors
///
/// `BadValueType("nil")` for `null` anywhere in the value,
/// `BadValueType` for a number with no `f64` representation.
pub fn from_json(json: &Json) -> Result<Value> {
    match json {
        Json::Null => Err(Error::BadValueType("nil".to_string())),
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| Error::BadValueType(format!("number {n}"))),
        Json::String(s) => Ok(Value::from(s.as_str())),
        Json::Array(items) => {
            let mut table = Table::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                table.push_distinct(Value::Number((i + 1) as f64), from_json(item)?);
            }
            Ok(Value::Table(table))
        }
        Json::Object(fields) => {
            let mut table = Table::with_capacity(fields.len());
            for (k, v) in fields {
                table.push_distinct(Value::from(k.as_str()), from_json(v)?);
            }
            Ok(Value::Table(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shmtree_core::{NaturalOrder, MIN_ZONE_SIZE};

    fn zone() -> Zone {
        Zone::anonymous("host", MIN_ZONE_SIZE * 2).unwrap()
    }

    #[test]
    fn test_insert_get_delete_replies() {
        let zone = zone();
        let mut order = NaturalOrder;

        let r = call(
            "insert",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Value(json!({"name": "ada", "tags": ["x", "y"]})),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::True);

        let r = call(
            "insert",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Value(json!(1)),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::False("the node exists"));

        let r = call(
            "get",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Value(json!("name")),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::Value(Value::from("ada")));

        let r = call(
            "delete",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::True);

        let r = call(
            "get",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::Nil("no exists"));

        let r = call(
            "delete",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("user")),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap();
        assert_eq!(r, Reply::False("no exists"));
    }

    #[test]
    fn test_field_replies() {
        let zone = zone();
        let mut order = NaturalOrder;
        zone.insert(&Value::from("n"), &Value::from(5), &mut order).unwrap();
        zone.insert(
            &Value::from("t"),
            &from_json(&json!({"a": true})).unwrap(),
            &mut order,
        )
        .unwrap();

        let get_field = |key: &str, field: &str, order: &mut NaturalOrder| {
            call(
                "get",
                vec![
                    HostArg::Zone(&zone),
                    HostArg::Value(json!(key)),
                    HostArg::Value(json!(field)),
                    HostArg::Order(order),
                ],
            )
            .unwrap()
        };
        assert_eq!(
            get_field("n", "a", &mut order),
            Reply::Nil("the value type isn't a table")
        );
        assert_eq!(get_field("t", "b", &mut order), Reply::Nil("no exists this field"));
        assert_eq!(get_field("t", "a", &mut order), Reply::Value(Value::from(true)));
        assert_eq!(get_field("missing", "a", &mut order), Reply::Nil("no exists"));
    }

    #[test]
    fn test_arity_errors() {
        let zone = zone();
        let err = call("delete", vec![HostArg::Zone(&zone)]).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #0 to 'delete' (expected 3 arguments)");

        let err = call("get", vec![HostArg::Zone(&zone)]).unwrap_err();
        assert!(matches!(err, Error::BadArgument { position: 0, .. }));

        let err = call("frobnicate", vec![]).unwrap_err();
        assert!(matches!(err, Error::BadArgument { ref function, .. } if function == "frobnicate"));
    }

    #[test]
    fn test_argument_kind_errors() {
        let zone = zone();
        let mut order = NaturalOrder;
        let err = call(
            "delete",
            vec![
                HostArg::Value(json!("not a zone")),
                HostArg::Value(json!("k")),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad argument #1 to 'delete' (expected zone, got value)"
        );

        let err = call(
            "delete",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("k")),
                HostArg::Value(json!("not an order")),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadArgument { position: 3, .. }));
    }

    #[test]
    fn test_nil_value_is_fatal() {
        let zone = zone();
        let mut order = NaturalOrder;
        let err = call(
            "insert",
            vec![
                HostArg::Zone(&zone),
                HostArg::Value(json!("k")),
                HostArg::Value(json!({"a": null})),
                HostArg::Order(&mut order),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadValueType(ref t) if t == "nil"));
        assert!(zone.is_empty().unwrap());
    }

    #[test]
    fn test_from_json_dispatch() {
        let v = from_json(&json!([10, "b", false])).unwrap();
        let t = v.as_table().unwrap();
        assert_eq!(t.get(&Value::from(1)), Some(&Value::from(10)));
        assert_eq!(t.get(&Value::from(2)), Some(&Value::from("b")));
        assert_eq!(t.get(&Value::from(3)), Some(&Value::from(false)));

        let v = from_json(&json!({"k": {"inner": 1.5}})).unwrap();
        let inner = v.as_table().unwrap().get(&Value::from("k")).unwrap();
        assert_eq!(
            inner.as_table().unwrap().get(&Value::from("inner")),
            Some(&Value::from(1.5))
        );
    }

    #[test]
    fn test_from_json_wide_array_is_linear() {
        let items: Vec<Json> = (0..50_000).map(Json::from).collect();
        let start = std::time::Instant::now();
        let v = from_json(&Json::Array(items)).unwrap();
        let elapsed = start.elapsed();

        let t = v.as_table().unwrap();
        assert_eq!(t.len(), 50_000);
        assert_eq!(t.get(&Value::from(50_000)), Some(&Value::from(49_999)));
        assert!(elapsed < std::time::Duration::from_secs(2), "conversion took {elapsed:?}");
    }
}
