//! Rebuilds driven by changes between runs.

use crate::e2e::*;
use filetime::FileTime;

const TWO_TOOLS: &str = "
a: a.c
  cp a.c a
b: b.c
  cp b.c b
group all: a b
";

#[test]
fn no_work_on_rerun() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", TWO_TOOLS)?;
    space.write("a.c", "a")?;
    space.write("b.c", "b")?;

    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: ran 3 rules, now up to date");

    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "kiln: no work to do\n");
    Ok(())
}

#[test]
fn changed_source_rebuilds_dependents() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", TWO_TOOLS)?;
    space.write("a.c", "a")?;
    space.write("b.c", "b")?;
    space.run_expect(&mut kiln_command(vec![]))?;

    space.write("a.c", "a, but longer")?;
    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "build a\n");
    assert_output_not_contains(&out, "build b\n");
    assert_eq!(space.read("a")?, b"a, but longer");
    Ok(())
}

#[test]
fn touched_source_rebuilds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  touch $out\n")?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec![]))?;

    // Same contents, different mtime.
    filetime::set_file_mtime(space.path("in"), FileTime::from_unix_time(1_000_000_000, 0))?;
    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: ran 1 rules, now up to date");
    Ok(())
}

#[test]
fn deleted_target_rebuilds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", TWO_TOOLS)?;
    space.write("a.c", "a")?;
    space.write("b.c", "b")?;
    space.run_expect(&mut kiln_command(vec![]))?;

    std::fs::remove_file(space.path("b"))?;
    let out = space.run_expect(&mut kiln_command(vec!["-d", "explain", "a", "b"]))?;
    assert_output_contains(&out, "kiln: ran 1 rules, now up to date");
    assert_stderr_contains(&out, "kiln explain: a: up to date");
    assert_stderr_contains(&out, "kiln explain: b: missing");
    Ok(())
}

#[test]
fn manifest_changes() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  cat $in > $out\n")?;
    space.write("in", "1")?;
    space.write("in2", "2")?;
    space.run_expect(&mut kiln_command(vec![]))?;

    space.write("build.kiln", "out: in in2\n  cat $in > $out\n")?;
    let out = space.run_expect(&mut kiln_command(vec!["-d", "explain"]))?;
    assert_stderr_contains(&out, "kiln explain: out: new parent in2");
    assert_eq!(space.read("out")?, b"12");

    space.write("build.kiln", "out: in2\n  cat $in > $out\n")?;
    let out = space.run_expect(&mut kiln_command(vec!["-d", "explain"]))?;
    assert_stderr_contains(&out, "kiln explain: out: removed parent in");
    assert_eq!(space.read("out")?, b"2");
    Ok(())
}

#[test]
fn failed_target_retried() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  test -f ok && touch $out\n")?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));

    space.write("ok", "")?;
    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: ran 1 rules, now up to date");
    Ok(())
}

#[test]
fn check_all() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "mid: in\n  cp in mid\nout: mid\n  cp mid out\n",
    )?;
    space.write("in", "in")?;
    space.run_expect(&mut kiln_command(vec![]))?;

    // Edit an intermediate file behind kiln's back.
    space.write("mid", "edited")?;
    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: no work to do");

    let out = space.run_expect(&mut kiln_command(vec!["--check-all"]))?;
    assert_output_contains(&out, "build out\n");
    assert_eq!(space.read("out")?, b"edited");
    Ok(())
}
