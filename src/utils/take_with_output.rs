/// Replace a value through a by-value state transition that also produces an
/// output. Built on [take_mut], so a panic in `cb` aborts rather than leaving
/// `src` uninitialized.
pub fn take_with_output<T, U>(src: &mut T, cb: impl FnOnce(T) -> (T, U)) -> U {
  take_mut::scoped::scope(|scope| {
    let (old, hole) = scope.take(src);
    let (new, out) = cb(old);
    hole.fill(new);
    out
  })
}
