//! SeaORM entity models

mod memory;

pub use memory::{
    ActiveModel as MemoryActiveModel, Column as MemoryColumn, Entity as MemoryEntity,
    Model as MemoryRow,
};
