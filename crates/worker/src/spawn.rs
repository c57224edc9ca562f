use std::cell::Cell;
use std::thread::JoinHandle;

use crate::TaskClass;

thread_local! {
	static CLASS: Cell<Option<TaskClass>> = const { Cell::new(None) };
}

/// Class the current thread was spawned with, or `None` for threads not
/// started through this crate.
pub fn current_class() -> Option<TaskClass> {
	CLASS.with(Cell::get)
}

fn classified<F, R>(class: TaskClass, f: F) -> impl FnOnce() -> R + Send + 'static
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	move || {
		CLASS.with(|c| c.set(Some(class)));
		f()
	}
}

/// Spawns an OS thread tagged with `class`, named after the class.
///
/// Fails only if the OS refuses to create the thread.
pub fn spawn_thread<F, R>(class: TaskClass, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_thread");
	std::thread::Builder::new()
		.name(format!("sibyl-{}", class.as_str()))
		.spawn(classified(class, f))
}

/// Spawns a named OS thread tagged with `class`.
///
/// Fails only if the OS refuses to create the thread.
pub fn spawn_named_thread<F, R>(class: TaskClass, name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(worker_class = class.as_str(), thread = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(classified(class, f))
}
