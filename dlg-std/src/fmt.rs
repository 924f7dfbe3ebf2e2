use std::fmt;

/// Displays a slice of elements using each element's [`fmt::Display`] impl,
/// e.g. `[1, 2, 3]`. Used for compact logging of window names, service
/// lists, etc.
pub struct DisplaySlice<'a, T>(pub &'a [T]);

impl<T: fmt::Display> fmt::Display for DisplaySlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "[")?;
        for item in self.0 {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{item}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_comma_separated() {
        let names = ["w1", "w2", "w3"];
        assert_eq!(DisplaySlice(&names).to_string(), "[w1, w2, w3]");
    }
}
