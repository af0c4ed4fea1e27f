//! 수집기 전반에서 사용되는 공통 타입.

mod job_run;
mod position;
mod quote;

pub use job_run::*;
pub use position::*;
pub use quote::*;
