mod kwargs;
mod resolver;
mod value;

pub use kwargs::Kwargs;
pub use resolver::{ConfigResolver, NoDecay, RawConfig, ResolvedConfig, read_config};
pub use value::ConfigValue;
