use std::collections::HashMap;
use std::sync::Arc;

/// Where environment variables are looked up.
///
/// Libraries read the process environment by default; tests use a fixed map
/// so they never have to mutate process state.
#[derive(Debug, Clone, Default)]
pub enum Environment {
    /// The live process environment
    #[default]
    Process,
    /// A fixed set of variables
    Fixed(Arc<HashMap<String, String>>),
}

impl Environment {
    /// The live process environment.
    pub fn process() -> Self {
        Environment::Process
    }

    /// A fixed environment holding exactly `variables`.
    pub fn fixed<I, K, V>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Environment::Fixed(Arc::new(
            variables
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// An environment with no variables.
    pub fn empty() -> Self {
        Environment::Fixed(Arc::default())
    }

    /// Looks up `name`. Unset, empty and non-unicode values are all `None`.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match self {
            Environment::Process => std::env::var(name).ok(),
            Environment::Fixed(variables) => variables.get(name).cloned(),
        };
        value.filter(|value| !value.is_empty())
    }

    /// Looks up the first of `names` that is set.
    pub fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_treats_empty_values_as_unset() {
        let environment = Environment::fixed([("S3_ACCESS_KEY", ""), ("S3_SECRET_KEY", "s")]);
        assert_eq!(environment.get("S3_ACCESS_KEY"), None);
        assert_eq!(environment.get("S3_SECRET_KEY").as_deref(), Some("s"));
        assert_eq!(environment.get("MISSING"), None);
    }

    #[test]
    fn it_finds_the_first_set_variable() {
        let environment = Environment::fixed([("SECOND", "2"), ("THIRD", "3")]);
        assert_eq!(environment.first_of(&["FIRST", "SECOND", "THIRD"]).as_deref(), Some("2"));
        assert_eq!(Environment::empty().first_of(&["FIRST"]), None);
    }
}
