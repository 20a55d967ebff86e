use std::path::Path;

use awgcompiler_backend::element::{Element, RefPoint};
use awgcompiler_backend::pulse::Pulse;
use awgcompiler_backend::sequence::Sequence;
use awgcompiler_backend::station::BaseStation;
use awgctrl_backend::adapter::LocalFileAdapter;
use awgctrl_backend::AwgStation;

fn main() {
    let adapter = LocalFileAdapter::new(Path::new("./awg_files")).unwrap();
    let mut station = AwgStation::new(Box::new(adapter), 1e9);
    for (id, name, kind, high, low) in [
        ("ch1", "RF1", "analog", 0.541, -0.541),
        ("ch2", "RF2", "analog", 0.541, -0.541),
        ("ch1_marker1", "readout_trigger", "marker", 1.0, 0.0),
        ("ch2_marker1", "MW_pulsemod", "marker", 1.0, 0.0),
    ] {
        BaseStation::define_channel(&mut station, id, name, kind, high, low, 0.0, 0.0, true)
            .unwrap();
    }

    let mut elem = Element::new("readout", 1e9);
    elem.add(
        Pulse::square("readout_trigger", 1.0, 1e-6),
        "trigger",
        0.1e-6,
        None,
        RefPoint::End,
        RefPoint::Start,
    )
    .unwrap();
    elem.add(
        Pulse::iq_mod("RF1", "RF2", 0.5, 10e-6, -50e6, 0.0, 1.0, 0.0),
        "measurement",
        2e-6,
        Some("trigger"),
        RefPoint::Start,
        RefPoint::Start,
    )
    .unwrap();

    let mut seq = Sequence::new("cooling");
    seq.append("readout", "readout", 1, true, None, None).unwrap();

    station.program_awg(&seq, &[elem], true).unwrap();
    station.start().unwrap();
    println!("device state: {}", station.state().unwrap());
    station.stop().unwrap();
}
