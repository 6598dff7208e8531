pub mod code;
pub mod lifecycle;

pub use code::{DEFAULT_MEMBER_CODE_PREFIX, MemberCodeAllocator};
pub use lifecycle::{MemberLifecycle, MemberProfile};
