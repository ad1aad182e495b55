pub mod assets;
pub mod loader;
pub mod player;
pub mod track;

pub use assets::{AssetStatus, ReferenceAssets, ReferenceReadiness};
pub use loader::{load_reference_track, ExerciseDescriptor};
pub use player::{HeadlessPlayer, ReferencePlayer};
pub use track::{parse_joint_table, parse_reference_table, swap_side_prefix, ReferenceSeries, SideLabels};
