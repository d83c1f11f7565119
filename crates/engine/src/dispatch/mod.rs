// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turning pending tasks into job projects and folding agent reports back
//! into Task and Image rows.

mod callbacks;
mod dispatcher;
mod queue;
mod retry;
mod tasks;

pub use callbacks::TaskCallbacks;
pub use dispatcher::{DispatchError, DispatchSettings, TaskDispatcher};
pub use queue::{DeadLetter, WorkQueue};
pub use retry::RetryPolicy;
pub use tasks::{TaskError, TaskService};
