use super::Cell;

/// Format a double the way the language prints one: integral finite values
/// drop the fractional part, everything else uses the shortest round-trip
/// form.
fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NAN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{}", d)
    }
}

impl Cell {
    /// String coercion with the language's legacy rules: null-ish and
    /// false are the empty string, true is "1", arrays stringify to
    /// "Array".
    pub fn to_string_value(&self) -> String {
        match self {
            Cell::Uninit | Cell::Null => String::new(),
            Cell::Bool(true) => "1".to_string(),
            Cell::Bool(false) => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Double(d) => format_double(*d),
            Cell::Str(s) | Cell::StaticStr(s) => s.to_string_lossy(),
            Cell::Array(_) => "Array".to_string(),
            Cell::Object(o) => format!("Object({})", o.class().name()),
            Cell::Resource(r) => format!("Resource id #{}", r.id),
            Cell::Ref(r) => r.snapshot().to_string_value(),
            Cell::Class(c) => c.name().to_string(),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_value())
    }
}
