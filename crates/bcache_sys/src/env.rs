//! Environment variable access and scoped mutation guards.
//!
//! Child compiler probes must run with a controlled environment, and the
//! process environment must be bitwise identical afterwards. The scoped
//! guards capture the prior value (or its absence) at construction and
//! restore it on drop, on every exit path.

/// Returns the value of an environment variable, or an empty string if it is
/// not defined or not valid Unicode.
pub fn get_env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// Returns all defined environment variables as `(name, value)` pairs.
pub fn get_env_all() -> Vec<(String, String)> {
    std::env::vars().collect()
}

/// Returns `true` if the environment variable is defined.
pub fn env_defined(name: &str) -> bool {
    std::env::var_os(name).is_some()
}

/// Defines an environment variable for this process.
pub fn set_env(name: &str, value: &str) {
    std::env::set_var(name, value);
}

/// Removes an environment variable from this process.
pub fn unset_env(name: &str) {
    std::env::remove_var(name);
}

/// A typed view of a single environment variable.
///
/// The value is captured at construction time. Accessors never fail: an
/// undefined variable reads as an empty string, zero, or false.
pub struct EnvVar {
    value: Option<String>,
}

impl EnvVar {
    /// Captures the current value of the named variable.
    pub fn new(name: &str) -> Self {
        Self {
            value: std::env::var(name).ok(),
        }
    }

    /// Returns `true` if the variable was defined at capture time.
    pub fn defined(&self) -> bool {
        self.value.is_some()
    }

    /// Returns the value as a string (empty if undefined).
    pub fn as_string(&self) -> String {
        self.value.clone().unwrap_or_default()
    }

    /// Returns the value parsed as a signed 64-bit integer (zero if
    /// undefined or unparsable).
    pub fn as_int64(&self) -> i64 {
        self.value
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Returns the value interpreted as a boolean.
    ///
    /// `false`, `off`, `no` and `0` (case-insensitive) and the empty string
    /// are false; any other defined value is true; undefined is false.
    pub fn as_bool(&self) -> bool {
        match self.value.as_deref() {
            None | Some("") => false,
            Some(v) => {
                let lower = v.to_lowercase();
                !matches!(lower.as_str(), "false" | "off" | "no" | "0")
            }
        }
    }
}

/// Sets an environment variable for the lifetime of the guard.
///
/// The prior value (or its absence) is restored when the guard is dropped.
pub struct ScopedSetEnv {
    name: String,
    prior: Option<String>,
}

impl ScopedSetEnv {
    /// Sets `name` to `value`, remembering the prior state.
    pub fn new(name: &str, value: &str) -> Self {
        let prior = std::env::var(name).ok();
        std::env::set_var(name, value);
        Self {
            name: name.to_string(),
            prior,
        }
    }
}

impl Drop for ScopedSetEnv {
    fn drop(&mut self) {
        match &self.prior {
            Some(value) => std::env::set_var(&self.name, value),
            None => std::env::remove_var(&self.name),
        }
    }
}

/// Unsets an environment variable for the lifetime of the guard.
///
/// The prior value (or its absence) is restored when the guard is dropped.
pub struct ScopedUnsetEnv {
    name: String,
    prior: Option<String>,
}

impl ScopedUnsetEnv {
    /// Removes `name` from the environment, remembering the prior state.
    pub fn new(name: &str) -> Self {
        let prior = std::env::var(name).ok();
        std::env::remove_var(name);
        Self {
            name: name.to_string(),
            prior,
        }
    }
}

impl Drop for ScopedUnsetEnv {
    fn drop(&mut self) {
        if let Some(value) = &self.prior {
            std::env::set_var(&self.name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses a unique variable name: the process environment is
    // global and tests run concurrently.

    #[test]
    fn define_read_and_undefine() {
        let name = "BCACHE_TEST_DEFINE_READ";
        set_env(name, "abcd");
        assert!(env_defined(name));
        assert_eq!(get_env(name), "abcd");
        unset_env(name);
        assert!(!env_defined(name));
    }

    #[test]
    fn get_env_all_contains_defined_variable() {
        let name = "BCACHE_TEST_GET_ALL";
        set_env(name, "value");
        let all = get_env_all();
        assert!(all.iter().any(|(n, v)| n == name && v == "value"));
        unset_env(name);
    }

    #[test]
    fn env_var_string_parsing() {
        let name = "BCACHE_TEST_STRING_VAR";
        set_env(name, "Hello world!");
        assert_eq!(EnvVar::new(name).as_string(), "Hello world!");
        unset_env(name);
        assert_eq!(EnvVar::new(name).as_string(), "");
    }

    #[test]
    fn env_var_integer_parsing() {
        let name = "BCACHE_TEST_INT_VAR";
        set_env(name, "6542667823978");
        assert_eq!(EnvVar::new(name).as_int64(), 6542667823978);
        set_env(name, "-1234567894561324");
        assert_eq!(EnvVar::new(name).as_int64(), -1234567894561324);
        set_env(name, "not a number");
        assert_eq!(EnvVar::new(name).as_int64(), 0);
        unset_env(name);
        assert_eq!(EnvVar::new(name).as_int64(), 0);
    }

    #[test]
    fn env_var_boolean_parsing() {
        let name = "BCACHE_TEST_BOOL_VAR";
        for truthy in ["TRUe", "On", "yES", "1", "Hello world!"] {
            set_env(name, truthy);
            assert!(EnvVar::new(name).as_bool(), "{truthy} should be true");
        }
        for falsy in ["FaLSe", "OfF", "No", "0", ""] {
            set_env(name, falsy);
            assert!(!EnvVar::new(name).as_bool(), "{falsy:?} should be false");
        }
        unset_env(name);
        assert!(!EnvVar::new(name).as_bool());
    }

    #[test]
    fn env_var_defined() {
        let name = "BCACHE_TEST_DEFINED_VAR";
        set_env(name, "Something");
        assert!(EnvVar::new(name).defined());
        unset_env(name);
        assert!(!EnvVar::new(name).defined());
    }

    #[test]
    fn scoped_set_restores_absence() {
        let name = "BCACHE_TEST_SCOPED_SET_ABSENT";
        unset_env(name);
        {
            let _guard = ScopedSetEnv::new(name, "Hello world!");
            assert_eq!(get_env(name), "Hello world!");
        }
        assert!(!env_defined(name));
    }

    #[test]
    fn scoped_set_restores_prior_value() {
        let name = "BCACHE_TEST_SCOPED_SET_PRIOR";
        set_env(name, "Lorem ipsum");
        {
            let _guard = ScopedSetEnv::new(name, "Hello world!");
            assert_eq!(get_env(name), "Hello world!");
        }
        assert_eq!(get_env(name), "Lorem ipsum");
        unset_env(name);
    }

    #[test]
    fn scoped_unset_restores_prior_value() {
        let name = "BCACHE_TEST_SCOPED_UNSET_PRIOR";
        set_env(name, "keep me");
        {
            let _guard = ScopedUnsetEnv::new(name);
            assert!(!env_defined(name));
        }
        assert_eq!(get_env(name), "keep me");
        unset_env(name);
    }

    #[test]
    fn scoped_unset_of_absent_variable_stays_absent() {
        let name = "BCACHE_TEST_SCOPED_UNSET_ABSENT";
        unset_env(name);
        {
            let _guard = ScopedUnsetEnv::new(name);
            assert!(!env_defined(name));
        }
        assert!(!env_defined(name));
    }
}
