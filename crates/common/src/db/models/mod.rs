//! SeaORM entity models

mod edition;

pub use edition::{
    Entity as EditionEntity,
    Model as EditionModel,
    ActiveModel as EditionActiveModel,
    Column as EditionColumn,
};
