use crate::e2e::*;

#[test]
fn empty_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "")?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "kiln: no work to do\n");
    Ok(())
}

#[test]
fn missing_manifest() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "kiln: error: read build.kiln");
    Ok(())
}

#[test]
fn basic_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  touch $out\n")?;
    space.write("in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_output_contains(&out, "build out");
    assert_output_contains(&out, "kiln: ran 1 rules, now up to date");
    assert!(space.read("out").is_ok());
    assert!(space.metadata(".kiln_db")?.len() > 0);
    Ok(())
}

#[test]
fn verbose_prints_commands() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  touch $out\n")?;
    space.write("in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["-v"]))?;
    assert_output_contains(&out, "touch out");
    Ok(())
}

#[test]
fn create_subdir() -> anyhow::Result<()> {
    // Run a build rule that needs a subdir to be automatically created.
    let space = TestSpace::new()?;
    space.write("build.kiln", "subdir/out: in\n  touch $out\n")?;
    space.write("in", "")?;
    space.run_expect(&mut kiln_command(vec!["subdir/out"]))?;
    assert!(space.read("subdir/out").is_ok());
    Ok(())
}

#[test]
fn directory_prefix_selects_targets() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "sub/a: in\n  touch $out\nsub/b: in\n  touch $out\nc: in\n  touch $out\n",
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["sub"]))?;
    assert_output_contains(&out, "kiln: ran 2 rules, now up to date");
    assert!(space.read("sub/a").is_ok());
    assert!(space.read("sub/b").is_ok());
    assert!(space.read("c").is_err());
    Ok(())
}

#[test]
fn unknown_target() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: in\n  touch $out\n")?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec!["in", "nope"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "not a target: 'in'");
    assert_output_contains(&out, "no targets found matching 'nope'");
    Ok(())
}

#[test]
fn parse_error() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out in\n  touch $out\n")?;
    let out = space.run(&mut kiln_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "build.kiln:1: parse error");
    Ok(())
}

#[test]
fn failure_stops_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "bad: in\n  false\ngood: in\n  touch $out\ngroup all: bad good\n",
    )?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec!["all"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "failed: bad");
    assert_output_contains(&out, "kiln: error: failed to build target: bad");
    assert_stderr_contains(&out, "command failed with exit status 1");
    assert!(space.read("good").is_err());
    Ok(())
}

#[test]
fn keep_going() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "bad: in\n  false\ngood: in\n  touch $out\ngroup all: bad good\n",
    )?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec!["-k", "all"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "kiln: error: failed to build 1 of 2 targets: bad");
    assert!(space.read("good").is_ok());
    Ok(())
}

#[test]
fn action_output() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "out: in\n  touch $out\naction test: out\n  echo testing $in\n",
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut kiln_command(vec!["test"]))?;
    assert_output_contains(&out, "testing out");
    assert_output_contains(&out, "kiln: ran 2 rules, now up to date");
    Ok(())
}

#[test]
fn pattern_parents() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "out: *.txt\n  cat $in > $out\n")?;
    space.write("a.txt", "a")?;
    space.write("b.txt", "b")?;
    space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_eq!(space.read("out")?, b"ab");

    // A new match is a new parent.
    space.write("c.txt", "c")?;
    space.run_expect(&mut kiln_command(vec!["out"]))?;
    assert_eq!(space.read("out")?, b"abc");
    Ok(())
}

#[test]
fn chdir() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    std::fs::create_dir(space.path("sub"))?;
    space.write("sub/build.kiln", "out: in\n  touch $out\n")?;
    space.write("sub/in", "")?;
    space.run_expect(&mut kiln_command(vec!["-C", "sub"]))?;
    assert!(space.read("sub/out").is_ok());
    Ok(())
}

#[test]
fn tools() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "out: in\n  touch $out\nout2: out\n  touch $out\ngroup all: out2\n",
    )?;
    space.write("in", "")?;

    let out = space.run_expect(&mut kiln_command(vec!["-t", "targets"]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "all: group\n");

    let out = space.run_expect(&mut kiln_command(vec!["-t", "rdeps", "out"]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "out:\n  out2\n");

    let out = space.run_expect(&mut kiln_command(vec!["-t", "graph"]))?;
    assert_output_contains(&out, "file out2 (state UNKNOWN)");
    assert_output_contains(&out, "  action: touch out2");

    space.run_expect(&mut kiln_command(vec![]))?;
    let out = space.run_expect(&mut kiln_command(vec!["-t", "records"]))?;
    assert_output_contains(&out, "out2:\n  target: ");
    assert_output_contains(&out, "  out: ");
    Ok(())
}

#[test]
fn interrupt_stops_keep_going() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.kiln",
        "a: in\n  kill -INT $$$$\nb: in\n  touch $out\ngroup all: a b\n",
    )?;
    space.write("in", "")?;
    let out = space.run(&mut kiln_command(vec!["-k", "all"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "build failure: a: interrupted");
    assert_output_contains(&out, "kiln: error: interrupted while building a");
    assert!(space.read("b").is_err());
    Ok(())
}

#[test]
fn target_without_parents() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.kiln", "gen.h:\n  touch $out\n")?;
    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: ran 1 rules, now up to date");
    assert!(space.read("gen.h").is_ok());

    let out = space.run_expect(&mut kiln_command(vec![]))?;
    assert_output_contains(&out, "kiln: no work to do");
    Ok(())
}
