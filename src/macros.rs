#![allow(unused_macros)]

/// Helper macro for locking items
///
/// Poisoned locks surface as [`crate::Error::LockError`] through `?`, so the
/// macro may only be used inside functions returning [`crate::Result`].
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_arc_rwlock);
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.read().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_arc_rwlock);
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.write().map_err(|_| crate::Error::LockError)?
    };
}
