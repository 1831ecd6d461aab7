//! Command handlers. Each returns the envelope to print or the failure to
//! report.

use crate::config::CliConfig;
use crate::output::{CommandError, Envelope};
use anyhow::Context;
use certlab_core::{
    clean_all, demo_request, open_db, seed_demo_data, CertificationRepository,
    CertificationService, CreateCertificationRequest, PersonRepository,
    SqliteCertificationRepository, SqliteGateway, SqlitePersonRepository,
};
use log::info;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

pub type CommandResult = Result<Envelope, CommandError>;

/// Shared state of one CLI invocation.
pub struct App {
    config: CliConfig,
    service: CertificationService<SqliteGateway>,
}

impl App {
    pub fn new(config: CliConfig) -> Self {
        let service = CertificationService::new(SqliteGateway::new(&config.db_path));
        Self { config, service }
    }

    pub fn seed(&self, clean: bool) -> CommandResult {
        let cleaned = if clean {
            let mut conn = self.connection()?;
            Some(clean_all(&mut conn)?)
        } else {
            None
        };

        let certification = seed_demo_data(&self.service)?;
        Ok(Envelope::ok(
            "Demo data created",
            json!({
                "cleaned": to_value(&cleaned)?,
                "certification": to_value(&certification)?,
            }),
        ))
    }

    pub fn create(&self, input: &Path) -> CommandResult {
        let request = read_request(input)?;
        request.validate()?;

        let certification = self.service.create_with_persons(&request)?;
        Ok(Envelope::ok(
            "Certification and persons created",
            to_value(&certification)?,
        ))
    }

    /// Runs the fault-injection variant; success means the index was past the
    /// roster end.
    pub fn simulate_error(&self, input: Option<&Path>, fail_at: usize) -> CommandResult {
        let request = match input {
            Some(path) => read_request(path)?,
            None => demo_request(),
        };
        request.validate()?;

        info!("event=cli_simulate module=cli status=start fail_at={fail_at}");
        let certification = self
            .service
            .create_with_simulated_failure(&request, fail_at)?;
        Ok(Envelope::ok(
            "No failure was injected; certification and persons created",
            to_value(&certification)?,
        ))
    }

    pub fn list_certifications(&self) -> CommandResult {
        let conn = self.connection()?;
        let certifications = SqliteCertificationRepository::try_new(&conn)?.list_certifications()?;
        Ok(Envelope::ok(
            "Certifications retrieved",
            to_value(&certifications)?,
        ))
    }

    pub fn show_certification(&self, id: Uuid) -> CommandResult {
        let conn = self.connection()?;
        let certification = SqliteCertificationRepository::try_new(&conn)?
            .get_certification(id)?
            .ok_or(CommandError::NotFound {
                entity: "certification",
                id,
            })?;
        Ok(Envelope::ok(
            "Certification retrieved",
            to_value(&certification)?,
        ))
    }

    pub fn delete_certification(&self, id: Uuid) -> CommandResult {
        let conn = self.connection()?;
        SqliteCertificationRepository::try_new(&conn)?.delete_certification(id)?;
        Ok(Envelope::ok(
            "Certification and its persons deleted",
            json!({ "id": id }),
        ))
    }

    pub fn list_persons(&self, certification: Option<Uuid>) -> CommandResult {
        let conn = self.connection()?;
        let persons = SqlitePersonRepository::try_new(&conn)?;

        let data = match certification {
            Some(id) => {
                let exists = SqliteCertificationRepository::try_new(&conn)?
                    .get_certification(id)?
                    .is_some();
                if !exists {
                    return Err(CommandError::NotFound {
                        entity: "certification",
                        id,
                    });
                }
                to_value(&persons.list_persons_by_certification(id)?)?
            }
            None => to_value(&persons.list_persons()?)?,
        };
        Ok(Envelope::ok("Persons retrieved", data))
    }

    pub fn show_person(&self, id: Uuid) -> CommandResult {
        let conn = self.connection()?;
        let person = SqlitePersonRepository::try_new(&conn)?
            .get_person(id)?
            .ok_or(CommandError::NotFound {
                entity: "person",
                id,
            })?;
        Ok(Envelope::ok("Person retrieved", to_value(&person)?))
    }

    fn connection(&self) -> Result<Connection, CommandError> {
        Ok(open_db(&self.config.db_path)?)
    }
}

/// Reads a create request from a JSON file, or stdin for `-`.
fn read_request(input: &Path) -> Result<CreateCertificationRequest, CommandError> {
    load_request(input).map_err(|err| CommandError::InvalidInput(format!("{err:#}")))
}

fn load_request(input: &Path) -> anyhow::Result<CreateCertificationRequest> {
    let raw = if input == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read request file `{}`", input.display()))?
    };

    serde_json::from_str(&raw).context("request is not a valid certification document")
}

fn to_value(value: &impl Serialize) -> Result<Value, CommandError> {
    serde_json::to_value(value)
        .map_err(|err| CommandError::Internal(format!("failed to encode response: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{load_request, App};
    use crate::config::CliConfig;
    use crate::output::CommandError;
    use certlab_core::WorkflowError;
    use std::io::Write;
    use uuid::Uuid;

    fn app(dir: &tempfile::TempDir) -> App {
        App::new(CliConfig {
            db_path: dir.path().join("certlab.sqlite3"),
            log_level: "info".to_string(),
            log_dir: None,
        })
    }

    #[test]
    fn request_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"title":"Rust","institution":"Academy","issueDate":"2024-01-15",
                "persons":[{{"fullName":"Ada","email":"ada@example.com","role":"Student"}}]}}"#
        )
        .unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.persons.len(), 1);

        let missing = load_request(&dir.path().join("missing.json")).unwrap_err();
        assert!(format!("{missing:#}").contains("missing.json"));
    }

    #[test]
    fn simulate_error_defaults_roll_back_the_demo_roster() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let err = app.simulate_error(None, 4).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Workflow(WorkflowError::SimulatedFailure { index: 4, .. })
        ));
        assert_eq!(err.status(), 400);

        let listed = app.list_certifications().unwrap();
        assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 0);
    }

    #[test]
    fn seed_twice_without_clean_is_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        app.seed(false).unwrap();
        let err = app.seed(false).unwrap_err();
        assert_eq!(err.error_code(), "duplicate_email");

        let reseeded = app.seed(true).unwrap();
        let data = reseeded.data.unwrap();
        assert_eq!(data["cleaned"]["personsDeleted"], 5);
        assert_eq!(data["certification"]["persons"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let id = Uuid::new_v4();

        assert_eq!(app.show_certification(id).unwrap_err().status(), 404);
        assert_eq!(app.delete_certification(id).unwrap_err().status(), 404);
        assert_eq!(app.show_person(id).unwrap_err().status(), 404);
        assert_eq!(app.list_persons(Some(id)).unwrap_err().status(), 404);
    }
}
