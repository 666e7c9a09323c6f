use dreadlock_instrument::{Instrumenter, revert};
mod common;
use common::{generate_unit, instrument_default, source_lines};

const FIXTURES: &[&str] = &[
    concat!(
        "#include \"worker.h\"\n",
        "#include <mutex>\n",
        "\n",
        "void Worker::run()\n",
        "{\n",
        "    std::unique_lock<std::mutex> lk(queue_mutex);\n",
        "    while (running)\n",
        "    {\n",
        "        lk.unlock();\n",
        "        process();  // may throw\n",
        "        lk.lock();\n",
        "    }\n",
        "}\n",
        "\n",
        "int Worker::size() const\n",
        "{\n",
        "    std::unique_lock<std::recursive_mutex> guard(this->state_mutex, std::defer_lock);\n",
        "    guard.lock();\n",
        "    return items.size();\n",
        "}\n",
    ),
    concat!(
        "void f()\r\n",
        "{\r\n",
        "    std::unique_lock<std::mutex> lk(m);\r\n",
        "    if (x) { y(); }\r\n",
        "}\r\n",
    ),
    // no trailing newline
    "void g()\n{\n    std::unique_lock<std::mutex> lk(obj.m);\n}",
];

#[test]
fn test_fixed_sources_round_trip() {
    for src in FIXTURES {
        let instrumented = instrument_default(src);
        assert!(instrumented.changed);
        let reverted = revert::revert(&instrumented.lines);
        assert!(reverted.found_markers());
        assert_eq!(reverted.lines, source_lines(src), "round trip of:\n{src}");
    }
}

#[test]
fn test_generated_sources_round_trip() {
    for seed in 0..200 {
        let unit = generate_unit(seed);
        let instrumented = instrument_default(&unit.source);
        let reverted = revert::revert(&instrumented.lines);
        assert_eq!(
            reverted.lines,
            source_lines(&unit.source),
            "seed {seed}:\n{}",
            unit.source
        );
    }
}

#[test]
fn test_round_trip_through_file_text() {
    let src = FIXTURES[0];
    let instrumented = instrument_default(src);
    let mut text = instrumented.lines.join("\n");
    text.push('\n');

    let reverted = revert::revert_source(&text);
    let mut restored = reverted.lines.join("\n");
    restored.push('\n');
    assert_eq!(restored, src);
}

#[test]
fn test_instrumenting_twice_changes_nothing() {
    for src in FIXTURES {
        let first = instrument_default(src);
        let second = Instrumenter::new()
            .instrument_source(&first.lines.join("\n"))
            .unwrap();
        assert!(!second.changed);
        assert_eq!(second.lines, first.lines);
    }

    for seed in 0..100 {
        let unit = generate_unit(seed);
        let first = instrument_default(&unit.source);
        let second = Instrumenter::new()
            .instrument_source(&first.lines.join("\n"))
            .unwrap();
        assert!(!second.changed, "seed {seed}");
    }
}

#[test]
fn test_disabled_markers_cannot_be_reverted() {
    let src = FIXTURES[2];
    let instrumented = Instrumenter::new()
        .revert_markers(false)
        .instrument_source(src)
        .unwrap();
    let reverted = revert::revert(&instrumented.lines);
    assert!(!reverted.found_markers());
}

#[test]
fn test_reverting_plain_source_finds_nothing() {
    let src = FIXTURES[0];
    let reverted = revert::revert_source(src);
    assert!(!reverted.found_markers());
    assert_eq!(reverted.lines, source_lines(src));
}
