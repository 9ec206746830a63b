pub(crate) mod lifecycle;
pub(crate) mod worker;

pub(crate) use lifecycle::Lifecycle;
pub(crate) use worker::{InitFn, Job, JobWork, Worker};
