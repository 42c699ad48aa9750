//! `{key}` template substitution for broadcast messages

/// Ordered set of placeholder values.
///
/// ```
/// use proximity_sync::placeholder::Placeholders;
///
/// let text = Placeholders::new()
///     .add("player.name", "alice")
///     .render("{player.name} joined the voice chat");
/// assert_eq!(text, "alice joined the voice chat");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(String, String)>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for `{key}`. A later value for the same key wins.
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.values.push((key, value)),
        }
        self
    }

    /// Replace every known `{key}`. Unknown placeholders are left as-is;
    /// substituted values are never rescanned.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let candidate = &rest[open + 1..];

            let replaced = candidate.find('}').and_then(|close| {
                let key = &candidate[..close];
                self.lookup(key).map(|value| (value, close))
            });

            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &candidate[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = candidate;
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
