mod brick;
mod brush;
mod map;
mod raymarch;
mod sector;

pub use {
    brick::{Brick, BRICK_DIM, BRICK_FLAG_SOLID, BRICK_VOLUME},
    brush::Brush,
    map::{BrickKey, SplitOutcome, XBrickMap, ATLAS_SLOT_SIZE},
    raymarch::{RayHit, MAX_RAY_STEPS},
    sector::{Sector, SECTOR_DIM, SECTOR_SIZE},
};
