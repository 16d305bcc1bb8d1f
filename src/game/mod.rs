pub mod remote;
pub mod session;
pub mod turn;

pub use remote::{BffClient, BoardSource, DirectorLink, FetchedBoard, LocalBff};
pub use session::{GameSession, PlayerProfile, ProfileFields};
pub use turn::{BoardLoad, BoardLoader, SubmitLatch, TurnDriver, TurnError, TurnReport};
