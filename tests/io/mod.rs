// Source opening and input discovery
mod compression;
mod glob;
