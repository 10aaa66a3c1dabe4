use std::cell::RefCell;
use std::rc::Rc;

/// A shared slot whose content can be removed by any of its clones. Used to
/// cancel work that has already been handed to a queue.
pub struct DeleteCell<T>(Rc<RefCell<Option<T>>>);
impl<T> DeleteCell<T> {
  pub fn new(t: T) -> Self { Self(Rc::new(RefCell::new(Some(t)))) }

  pub fn take(&self) -> Option<T> { self.0.borrow_mut().take() }

  pub fn is_live(&self) -> bool { self.0.borrow().is_some() }
}
impl<T> Clone for DeleteCell<T> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

#[cfg(test)]
mod test {
  use super::DeleteCell;

  #[test]
  fn take_once() {
    let cell = DeleteCell::new(5);
    let other = cell.clone();
    assert!(other.is_live());
    assert_eq!(cell.take(), Some(5));
    assert!(!other.is_live());
    assert_eq!(other.take(), None);
  }
}
