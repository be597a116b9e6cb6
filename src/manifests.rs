pub mod loaders;
pub mod modrinth;
pub mod vanilla;
