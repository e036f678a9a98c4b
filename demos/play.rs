/* Play - opening Csound at runtime
 *
 * Loads libcsound64 (set CSOUND_LIB or CSOUND_LIB_DIR to point at a
 * specific build), configures the engine through options, compiles a CSD
 * and then an orchestra string on top of it and performs until the score
 * is done.
 *
 * Run with `RUST_LOG=info cargo run --example play` to see Csound's own
 * console output, which is forwarded to the `log` crate. An output other
 * than the sound card can be given as the first argument, e.g.
 * `cargo run --example play -- -otest.wav`.
 */

extern crate csound_dynamic;
extern crate env_logger;

use csound_dynamic::{Csound, CsoundLib};
use std::env;
use std::process;

static CSD: &str = "
<CsoundSynthesizer>
<CsInstruments>
instr 1
    a1 = oscil(0.5, 440)
    outs a1, a1
endin
</CsInstruments>
<CsScore>
i1 0 2
</CsScore>
</CsoundSynthesizer>
";

static ORC: &str = "
instr 2
    a1 = oscil(0.25, 660)
    outs a1, a1
endin

schedule(2, 0, 4)
";

fn run(output: &str) -> csound_dynamic::Result<()> {
    let lib = CsoundLib::global()?;
    println!("Csound Version: {}", lib.version());
    println!("Loaded from: {}", lib.path().display());

    let csound = Csound::with_library(lib)?;
    csound.forward_messages_to_log();

    /* Using set_option() to configure Csound
    Note: use only one commandline flag at a time */
    csound.set_option(output)?;
    csound.set_option("--ksmps=64")?;
    csound.set_option("--sample-rate=48000")?;
    csound.set_option("--nchnls=2")?;
    csound.set_option("--nchnls_i=1")?;
    csound.set_option("--0dbfs=1")?;

    println!("Sample Rate: {}", csound.get_sample_rate());
    println!("Control Rate: {}", csound.get_control_rate());
    println!("ksmps: {}", csound.get_ksmps());
    println!("0dbfs: {}", csound.get_0dBFS());

    csound.compile_csd_text(CSD)?;
    csound.compile_orc(ORC)?;

    /* When compiling from strings, this call is necessary
     * before doing any performing */
    csound.start()?;

    while !csound.perform_ksmps() {}

    csound.stop();
    Ok(())
}

fn main() {
    env_logger::init();

    let output = env::args().nth(1).unwrap_or_else(|| "-odac".to_owned());
    if let Err(e) = run(&output) {
        eprintln!("play: {}", e);
        process::exit(1);
    }
}
