//! Runs queue drain tasks on the browser's microtask queue.

use std::rc::Rc;

use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};

/// A [`LocalSpawn`] backed by `wasm_bindgen_futures::spawn_local`.
///
/// Never refuses a task.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserSpawner;

impl BrowserSpawner {
    /// A shared handle, in the form the operation queue takes.
    #[must_use]
    pub fn shared() -> Rc<dyn LocalSpawn> {
        Rc::new(Self)
    }
}

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}
