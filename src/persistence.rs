use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use crate::{
    error::{OptimErr, Result},
    handle::StateDict,
};

/// Where optimizer checkpoints are kept.
pub trait StateStore {
    fn save(&self, path: &Path, state: &StateDict) -> Result<()>;

    fn load(&self, path: &Path) -> Result<StateDict>;
}

/// Stores each state as a JSON document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStateStore;

impl StateStore for JsonStateStore {
    fn save(&self, path: &Path, state: &StateDict) -> Result<()> {
        let file = File::create(path).map_err(OptimErr::Persistence)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, state)?;
        writer.flush().map_err(OptimErr::Persistence)
    }

    fn load(&self, path: &Path) -> Result<StateDict> {
        let file = File::open(path).map_err(OptimErr::Persistence)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
