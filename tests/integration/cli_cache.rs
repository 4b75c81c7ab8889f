//! `provman cache list`.

use anyhow::Result;

use crate::common::TestProject;

#[test]
fn test_list_empty_cache() -> Result<()> {
    let project = TestProject::new()?;
    project.run_provman(&["cache", "list"])?.assert_success().assert_stdout_contains("No providers cached");
    Ok(())
}

#[test]
fn test_list_after_install() -> Result<()> {
    let project = TestProject::new()?;
    let fixture = project.add_mirror_package("hashicorp/null", "2.1.0")?;
    project.add_mirror_package("hashicorp/random", "3.4.0")?;
    let mirror = project.mirror_path().display().to_string();

    project
        .run_provman(&[
            "install",
            "--plugin-dir",
            &mirror,
            "--require",
            "hashicorp/null",
            "--require",
            "hashicorp/random",
        ])?
        .assert_success();

    project
        .run_provman(&["cache", "list"])?
        .assert_success()
        .assert_stdout_contains("registry.terraform.io/hashicorp/null")
        .assert_stdout_contains("registry.terraform.io/hashicorp/random")
        .assert_stdout_contains("3.4.0");

    project
        .run_provman(&["cache", "list", "--hashes"])?
        .assert_success()
        .assert_stdout_contains(fixture.h1_hash()?.as_str());
    Ok(())
}
