use thiserror::Error;

/// A closing tag that did not match the innermost open element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected </{}> but found </{found}>", expected.as_deref().unwrap_or("(nothing open)"))]
pub struct TagMismatch {
    pub expected: Option<String>,
    pub found: String,
}

/**
The chain of element names enclosing the parser's current position.

The same element name means different things in different places, a `<cvParam>`
under `<isolationWindow>` is not one under `<selectedIon>`, so the importer asks
[`TagTracker::inside`] rather than keeping a flag per context.
*/
#[derive(Debug, Default, Clone)]
pub struct TagTracker {
    stack: Vec<String>,
}

impl TagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter<S: Into<String>>(&mut self, name: S) {
        self.stack.push(name.into());
    }

    /// Close the innermost element, which must be `name`.
    ///
    /// On mismatch the stack is left untouched.
    pub fn exit(&mut self, name: &str) -> Result<(), TagMismatch> {
        match self.stack.last() {
            Some(open) if open == name => {
                self.stack.pop();
                Ok(())
            }
            open => Err(TagMismatch {
                expected: open.cloned(),
                found: name.to_string(),
            }),
        }
    }

    /// Whether `name` is the current element or any of its ancestors
    pub fn inside(&self, name: &str) -> bool {
        self.stack.iter().rev().any(|open| open == name)
    }

    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(|s| s.as_str())
    }

    pub fn parent(&self) -> Option<&str> {
        let n = self.stack.len();
        if n < 2 {
            None
        } else {
            Some(self.stack[n - 2].as_str())
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.stack.iter().map(|s| s.as_str())
    }
}
