//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a store from an optional JSON config and exercise both repositories.
//! - Keep output deterministic apart from database-assigned ids.

use roster_core::{
    init_logging, open_db_with_config, CoreConfig, CrudRepository, Member, MemberRepository,
    PageRequest, Sort, Team, TeamRepository,
};
use std::env;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("roster_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match env::args().nth(1) {
        Some(path) => CoreConfig::from_file(path)?,
        None => CoreConfig::default(),
    };
    config.validate()?;

    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, &log_dir.to_string_lossy())?;
    }

    let conn = open_db_with_config(&config)?;
    let audit = Arc::new(config.audit_interceptor());
    let teams = TeamRepository::try_new(&conn, Arc::clone(&audit))?;
    let members = MemberRepository::try_new(&conn, audit)?;

    println!("roster_core version={}", roster_core::core_version());
    println!(
        "finders member={} team={}",
        members.finders().len(),
        teams.finders().len()
    );

    let team = match teams.find_by_name("smoke")?.into_iter().next() {
        Some(team) => team,
        None => teams.save(Team::new("smoke"))?,
    };
    let team_id = team.id.ok_or("saved team has no id")?;
    for index in 0..3 {
        members.save(Member::with_team(format!("smoke-{index}"), 25, team_id))?;
    }

    let page = members.find_by_age(25, &PageRequest::new(0, 2, Sort::desc("username"))?)?;
    println!(
        "page total_elements={} total_pages={} has_next={}",
        page.total_elements(),
        page.total_pages(),
        page.has_next()
    );
    println!("bulk_age_plus affected={}", members.bulk_age_plus(25)?);
    println!("member count={}", members.count()?);
    Ok(())
}
