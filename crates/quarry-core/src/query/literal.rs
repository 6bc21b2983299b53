//! Literal rendering for `to_prepared_sql`.
//!
//! Output is meant for humans pasting a statement into a console. It is
//! never sent to a driver.

use quarry_proto::Value;

/// Substitute `$n` placeholders in `sql` with literal renderings of
/// `params`.
///
/// Compiled SQL contains no quoted text of its own, so a single left to
/// right scan finds every placeholder; substituted literals are never
/// rescanned.
pub fn to_prepared_sql(sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut end = start + 1;
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + 1;
            chars.next();
        }
        let index = sql[start + 1..end].parse::<usize>().ok();
        match index.and_then(|n| n.checked_sub(1)).and_then(|i| params.get(i)) {
            Some(value) => out.push_str(&literal(value)),
            None => out.push_str(&sql[start..end]),
        }
    }
    out
}

/// SQL literal for a value.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float32(f) => float(f64::from(*f)),
        Value::Float64(f) => float(*f),
        Value::String(s) => quote(s),
        Value::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
        Value::Timestamp(micros) => {
            let sign = if *micros < 0 { "-" } else { "" };
            let abs = micros.unsigned_abs();
            format!(
                "to_timestamp({}{}.{:06})",
                sign,
                abs / 1_000_000,
                abs % 1_000_000
            )
        }
        Value::Uuid(u) => quote(&uuid_string(u)),
        Value::BoolArray(arr) => array(arr.iter().map(|b| literal(&Value::Bool(*b)))),
        Value::Int32Array(arr) => array(arr.iter().map(i32::to_string)),
        Value::Int64Array(arr) => array(arr.iter().map(i64::to_string)),
        Value::Float64Array(arr) => array(arr.iter().map(|f| float(*f))),
        Value::StringArray(arr) => array(arr.iter().map(|s| quote(s))),
    }
}

/// Canonical hyphenated form of a UUID.
pub(crate) fn uuid_string(u: &[u8; 16]) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&u[0..4]),
        hex::encode(&u[4..6]),
        hex::encode(&u[6..8]),
        hex::encode(&u[8..10]),
        hex::encode(&u[10..16])
    )
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn float(f: f64) -> String {
    if f.is_finite() {
        f.to_string()
    } else {
        // NaN and infinities only exist as quoted literals.
        quote(&f.to_string().replace("inf", "Infinity"))
    }
}

fn array(items: impl Iterator<Item = String>) -> String {
    format!("ARRAY[{}]", items.collect::<Vec<_>>().join(","))
}
