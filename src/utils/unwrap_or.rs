/// A macro version of [Option::unwrap_or_else] which supports flow
/// control statements such as `return` and `break` in the "else" branch.
///
/// ```ignore
/// crate::utils::unwrap_or!(queue.pop_front(); return)
/// ```
macro_rules! unwrap_or {
  ($m:expr; $fail:expr) => {{ if let Some(res) = ($m) { res } else { $fail } }};
}

pub(crate) use unwrap_or;
