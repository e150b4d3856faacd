use serde_json::Value;

const MAX_CELL_WIDTH: usize = 48;

/// Render a list response as an ASCII table.
///
/// Accepts a top-level array of objects or a paged envelope whose list sits
/// under `items`, `data`, `results` or `value`. Returns `None` for any other
/// shape (and for empty lists) so the caller can fall back to pretty JSON.
pub fn render_table(val: &Value) -> Option<String> {
    let rows = list_of(val)?;
    if rows.is_empty() { return None; }

    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        let Value::Object(map) = row else { return None; };
        for k in map.keys() {
            if !cols.contains(k) { cols.push(k.clone()); }
        }
    }
    // "id" first, the rest in first-seen order
    if let Some(pos) = cols.iter().position(|c| c.eq_ignore_ascii_case("id")) {
        let id = cols.remove(pos);
        cols.insert(0, id);
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| cols.iter().map(|c| cell_text(row.get(c).unwrap_or(&Value::Null))).collect())
        .collect();

    let mut widths: Vec<usize> = cols.iter().map(|c| c.chars().count().min(MAX_CELL_WIDTH)).collect();
    for r in &cells {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count().min(MAX_CELL_WIDTH));
        }
    }

    let sep = separator(&widths);
    let mut out = String::new();
    out.push_str(&sep);
    out.push_str(&line(&cols, &widths));
    out.push_str(&sep);
    for r in &cells {
        out.push_str(&line(r, &widths));
    }
    out.push_str(&sep);
    let mut summary = format!("rows: {}", rows.len());
    if let Some(total) = val.get("totalCount").or_else(|| val.get("total")).and_then(Value::as_u64) {
        summary.push_str(&format!(" of {}", total));
    }
    out.push_str(&summary);
    out.push('\n');
    Some(out)
}

fn list_of(val: &Value) -> Option<&Vec<Value>> {
    match val {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["items", "data", "results", "value"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array)),
        _ => None,
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    s.push('\n');
    s
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (cell, w) in cells.iter().zip(widths) {
        let text = truncate(cell, *w);
        let pad = w.saturating_sub(text.chars().count());
        if is_numeric_like(cell) {
            s.push_str(&format!(" {}{} |", " ".repeat(pad), text));
        } else {
            s.push_str(&format!(" {}{} |", text, " ".repeat(pad)));
        }
    }
    s.push('\n');
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().any(|c| c.is_ascii_digit()) && st.chars().all(|c| c.is_ascii_digit() || ".-+eE,_".contains(c))
}
