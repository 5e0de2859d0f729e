use serde::Serialize;
use std::fmt;
use std::panic::Location;

/// Source location of an intercepted call: file, enclosing function and line.
///
/// Built by the [`site!`](crate::site) macro, which every tracking macro
/// expands, or by [`CallSite::caller`] from a `#[track_caller]` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
        }
    }

    /// Captures the location of the caller. The function name is not
    /// available this way and is reported as `?`.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), "?", location.line())
    }

    /// Whether `other` happened in a different source file. Compares file
    /// names by content.
    pub fn is_other_file(&self, other: &CallSite) -> bool {
        self.file != other.file
    }

    /// `file:function:line`, the long form used in error lines.
    pub fn qualified(&self) -> String {
        format!("{}:{}:{}", self.file, self.function, self.line)
    }

    #[doc(hidden)]
    pub fn function_from_type_name(type_name: &'static str) -> &'static str {
        let mut name = type_name
            .strip_suffix("::__mtrack_site")
            .unwrap_or(type_name);
        while let Some(stripped) = name.strip_suffix("::{{closure}}") {
            name = stripped;
        }
        name
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Captures the current [`CallSite`]: `file!()`, `line!()` and the path of the
/// enclosing function.
///
/// ```rust
/// fn load() -> mtrack::CallSite {
///     mtrack::site!()
/// }
///
/// let site = load();
/// assert!(site.function.ends_with("load"));
/// ```
#[macro_export]
macro_rules! site {
    () => {{
        fn __mtrack_site() {}
        $crate::CallSite::new(
            file!(),
            $crate::CallSite::function_from_type_name(::std::any::type_name_of_val(
                &__mtrack_site,
            )),
            line!(),
        )
    }};
}
