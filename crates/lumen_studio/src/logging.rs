//! Log output for the studio binary.

use std::io::Write;

/// Installs the `log` backend.
///
/// `RUST_LOG` overrides the default filter (`info`, or `debug` with
/// `verbose`).
pub fn init_log(verbose: bool) {
  let default = if verbose {
    log::LevelFilter::Debug
  } else {
    log::LevelFilter::Info
  };
  env_logger::Builder::new()
    .filter(None, default)
    .parse_default_env()
    .format(|buf, record| {
      let style = buf.default_level_style(record.level());
      writeln!(
        buf,
        "{style}{:<5}{style:#} [{}] {}",
        record.level(),
        record.target(),
        record.args()
      )
    })
    .init();
}

/// Tracy profiling. Connect the Tracy profiler to see the spans.
#[cfg(feature = "tracy")]
pub fn init_tracy() {
  use tracing_subscriber::prelude::*;

  tracing_subscriber::registry()
    .with(tracing_tracy::TracyLayer::default())
    .init();
}
