//! Indented XML rendering for diagnostic output.
//!
//! The output has no declaration and is only meant for logs; it is not a
//! persisted format.

pub struct XmlWriter {
    out: String,
    depth: usize,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    pub fn start_element(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.open_tag(name, attrs);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    pub fn end_element(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str(&format!("</{}>\n", name));
    }

    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.open_tag(name, attrs);
        self.out.push_str(" />\n");
    }

    /// Writes an event named after its kind. Kinds that are not valid element
    /// names fall back to `<Event kind="..." />`.
    pub fn event_element(&mut self, kind: &str, attrs: &[(&str, String)]) {
        if is_name(kind) {
            self.empty_element(kind, attrs);
            return;
        }
        let mut all = Vec::with_capacity(attrs.len() + 1);
        all.push(("kind", kind.to_string()));
        all.extend(attrs.iter().cloned());
        self.empty_element("Event", &all);
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn open_tag(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out
                .push_str(&format!(r#" {}="{}""#, key, escape(value)));
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }
}

/// Conservative XML name check: a letter or `_`, then letters, digits, `_`, `-` or `.`.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_elements_are_indented() {
        let mut w = XmlWriter::new();
        w.start_element("OrderedTraces", &[]);
        w.empty_element("UserTrace", &[("message", "A".to_string())]);
        w.end_element("OrderedTraces");
        assert_eq!(
            w.finish(),
            "<OrderedTraces>\n  <UserTrace message=\"A\" />\n</OrderedTraces>\n"
        );
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut w = XmlWriter::new();
        w.empty_element("UserTrace", &[("message", r#"a<b & "c""#.to_string())]);
        assert_eq!(
            w.finish(),
            "<UserTrace message=\"a&lt;b &amp; &quot;c&quot;\" />\n"
        );
    }

    #[test]
    fn kinds_that_are_not_names_use_event_element() {
        let mut w = XmlWriter::new();
        w.event_element("ActivityTrace", &[("message", "a".to_string())]);
        w.event_element("My <Kind>", &[("message", "b".to_string())]);
        w.event_element("9lives", &[]);
        assert_eq!(
            w.finish(),
            "<ActivityTrace message=\"a\" />\n\
             <Event kind=\"My &lt;Kind&gt;\" message=\"b\" />\n\
             <Event kind=\"9lives\" />\n"
        );
    }
}
