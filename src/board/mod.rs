pub mod normalize;
pub mod template;
pub mod tile;

pub use normalize::{normalize_against, normalize_board, validate_board, BoardValidation};
pub use template::{create_template_board, create_template_board_for, Language};
pub use tile::{BoardSpec, BoardTile, Effect, EffectType, TileType, World};
