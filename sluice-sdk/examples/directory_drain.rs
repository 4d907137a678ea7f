//! Drain a directory one file at a time, archiving each file once read.
//!
//! ```sh
//! cargo run -p sluice-sdk --example directory_drain -- /tmp/inbox /tmp/done
//! ```

use std::env;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sluice_sdk::{ExecutionMode, FileByFileSource, PollSource, PollSourceExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "inbox".to_string());
    let archive = args.next().unwrap_or_else(|| "done".to_string());

    let files = Arc::new(
        FileByFileSource::builder(&input)
            .target_dir(&archive)
            .ignore_hidden(true)
            .build()?,
    );

    let pipeline = Arc::clone(&files)
        .after_batch(|| println!("-- batch complete --"), ExecutionMode::Sync)
        .inactivity_backoff(Duration::from_secs(2));

    println!("draining {input} into {archive}, Ctrl-C to stop");
    loop {
        match pipeline.poll().into_option() {
            Some((path, name)) => {
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                println!("{name}: {size} bytes");
                files.relocate()?;
            }
            None => thread::sleep(Duration::from_millis(250)),
        }
    }
}
