pub mod directory;
pub mod member;
pub mod repository;

pub use directory::MemberDirectory;
pub use member::Member;
pub use repository::{
    InMemoryMemberRepository, JsonFileMemberRepository, MemberRepository, StorageError,
};
