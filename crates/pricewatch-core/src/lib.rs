//! # PriceWatch Core
//!
//! 가격 수집기 전반에서 공유하는 도메인 모델과 로깅 인프라를 제공합니다:
//! - 시세 스냅샷 (`Quote`)
//! - 작업 실행 기록 (`JobRun`, `JobStatus`)
//! - 보유 포지션 (`Position`)
//! - 로깅 초기화

pub mod error;
pub mod logging;
pub mod types;

pub use error::*;
pub use logging::*;
pub use types::*;
