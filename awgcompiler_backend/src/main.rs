use awgcompiler_backend::*;

fn main() {
    let mut station = Station::new(1e9);
    for (id, name, kind, high, low) in [
        ("ch1", "RF1", "analog", 0.541, -0.541),
        ("ch2", "RF2", "analog", 0.541, -0.541),
        ("ch1_marker1", "readout_trigger", "marker", 1.0, 0.0),
    ] {
        BaseStation::define_channel(&mut station, id, name, kind, high, low, 0.0, 0.0, true)
            .unwrap();
    }

    let mut elem = Element::new("demo_element", 1e9);
    elem.add(
        Pulse::square("readout_trigger", 1.0, 100e-9),
        "trigger",
        100e-9,
        None,
        RefPoint::End,
        RefPoint::Start,
    )
    .unwrap();
    elem.add(
        Pulse::ssb_drag("RF1", "RF2", 0.4, 25e-9, 4.0, 0.1, 50e6, 0.0, 1.0, 0.0),
        "pi_pulse",
        0.0,
        Some("trigger"),
        RefPoint::End,
        RefPoint::Start,
    )
    .unwrap();

    let mut seq = Sequence::new("demo");
    seq.append("only", "demo_element", 1, true, None, None)
        .unwrap();

    let files = station.render_program(&seq, &[elem], true).unwrap();
    for (name, bytes) in &files.waveforms {
        println!("{}: {} bytes", name, bytes.len());
    }
    println!("{}: {} bytes", files.sequence.0, files.sequence.1.len());
}
