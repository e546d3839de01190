use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::model::{AccountId, Command, Coupon, CouponId, EventId, NewEvent};
use crate::reward::RewardProfile;

/// Errors that can occur when reading csv input
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command type '{command_type}'")]
    UnrecognizedType { line: usize, command_type: String },

    #[error("line {line}: {command_type} missing {field}")]
    MissingField {
        line: usize,
        command_type: String,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct EventRow {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reward_description: String,
    total_coupons: u32,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    organizer_type: String,
    #[serde(default)]
    target_major: String,
    #[serde(default)]
    target_grade: String,
    #[serde(default)]
    brand_score: Option<f64>,
    #[serde(default)]
    target_participants: Option<f64>,
}

/// An event definition and, if the row names a participation goal, the
/// profile to ask the reward advisor about.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event: NewEvent,
    pub reward: Option<RewardProfile>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        let reward = row.target_participants.map(|target_participants| RewardProfile {
            event_type: row.event_type,
            organizer_type: row.organizer_type,
            target_major: row.target_major,
            target_grade: row.target_grade,
            brand_score: row.brand_score.unwrap_or_default(),
            target_participants,
        });
        Self {
            event: NewEvent {
                title: row.title,
                description: row.description,
                reward_description: row.reward_description,
                total_coupons: row.total_coupons,
                start_at: row.start_at,
                end_at: row.end_at,
            },
            reward,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandRow {
    r#type: String,
    account: Option<AccountId>,
    event: Option<EventId>,
    coupon: Option<CouponId>,
}

#[derive(Debug, Serialize)]
struct CouponRow {
    coupon: CouponId,
    event: EventId,
    account: AccountId,
    status: &'static str,
    queue_position: Option<u32>,
    applied_at: String,
    issued_at: Option<String>,
    redeemed_at: Option<String>,
    no_show_at: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read event definitions (`title,total_coupons,start_at,end_at` plus optional
/// `description,reward_description` and reward profile columns) from a csv file
pub fn read_events(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<EventRecord, CsvError>>, CsvError> {
    Ok(reader(path.as_ref())?
        .into_deserialize::<EventRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            result
                .map(EventRecord::from)
                .map_err(|source| CsvError::Parse { line, source })
        }))
}

/// Read commands (`type,account,event,coupon`) from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    Ok(reader(path.as_ref())?
        .into_deserialize::<CommandRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let require = |value: Option<u64>, field: &'static str| {
                value.ok_or_else(|| CsvError::MissingField {
                    line,
                    command_type: row.r#type.clone(),
                    field,
                })
            };
            match row.r#type.as_str() {
                "apply" => Ok(Command::Apply {
                    account: require(row.account, "account")?,
                    event: require(row.event, "event")?,
                }),
                "redeem" => Ok(Command::Redeem {
                    coupon: require(row.coupon, "coupon")?,
                }),
                "no_show" => Ok(Command::NoShow {
                    account: require(row.account, "account")?,
                    coupon: require(row.coupon, "coupon")?,
                }),
                other => Err(CsvError::UnrecognizedType {
                    line,
                    command_type: other.to_string(),
                }),
            }
        }))
}

/// write coupon ledger entries in csv format
pub fn write_coupons<'a>(
    writer: impl io::Write,
    coupons: impl IntoIterator<Item = &'a Coupon>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for coupon in coupons {
        writer.serialize(CouponRow {
            coupon: coupon.id,
            event: coupon.event,
            account: coupon.account,
            status: coupon.status.as_str(),
            queue_position: coupon.queue_position,
            applied_at: coupon.applied_at.to_rfc3339(),
            issued_at: coupon.issued_at.map(|t| t.to_rfc3339()),
            redeemed_at: coupon.redeemed_at.map(|t| t.to_rfc3339()),
            no_show_at: coupon.no_show_at.map(|t| t.to_rfc3339()),
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn commands(content: &str) -> Vec<Result<Command, CsvError>> {
        let file = write_csv(content);
        read_commands(file.path()).unwrap().collect()
    }

    #[test]
    fn read_event() {
        let file = write_csv(
            "title,total_coupons,start_at,end_at\n\
             festival,3,2025-03-01T09:00:00Z,2025-03-08T09:00:00Z\n",
        );
        let events: Vec<_> = read_events(file.path()).unwrap().collect();
        assert_eq!(events.len(), 1);

        let record = events.into_iter().next().unwrap().unwrap();
        assert_eq!(record.event.title, "festival");
        assert_eq!(record.event.total_coupons, 3);
        assert_eq!(record.event.description, "");
        assert_eq!(
            record.event.start_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(record.reward, None);
    }

    #[test]
    fn read_event_with_reward_profile() {
        let file = write_csv(
            "title,total_coupons,start_at,end_at,event_type,organizer_type,target_major,target_grade,brand_score,target_participants\n\
             festival,3,2025-03-01T09:00:00Z,2025-03-08T09:00:00Z,festival,club,all,all,4.5,120\n\
             seminar,3,2025-03-01T09:00:00Z,2025-03-08T09:00:00Z,talk,dept,cs,3,,\n",
        );
        let records: Vec<_> = read_events(file.path())
            .unwrap()
            .map(Result::unwrap)
            .collect();

        let profile = records[0].reward.as_ref().unwrap();
        assert_eq!(profile.event_type, "festival");
        assert_eq!(profile.brand_score, 4.5);
        assert_eq!(profile.target_participants, 120.0);
        // no participation goal, nothing to ask the advisor
        assert_eq!(records[1].reward, None);
    }

    #[test]
    fn read_event_with_bad_timestamp() {
        let file = write_csv("title,total_coupons,start_at,end_at\nfestival,3,tomorrow,later\n");
        let events: Vec<_> = read_events(file.path()).unwrap().collect();
        assert!(matches!(events[0], Err(CsvError::Parse { line: 2, .. })));
    }

    #[test]
    fn read_all_command_types() {
        let results = commands(
            "type,account,event,coupon\n\
             apply,7,1,\n\
             redeem,,,3\n\
             no_show,7,,4\n",
        );
        let parsed: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            parsed,
            vec![
                Command::Apply {
                    account: 7,
                    event: 1
                },
                Command::Redeem { coupon: 3 },
                Command::NoShow {
                    account: 7,
                    coupon: 4
                },
            ]
        );
    }

    #[test]
    fn read_with_whitespace() {
        let results = commands("type, account, event, coupon\napply, 1, 1, \n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_type() {
        let results = commands("type,account,event,coupon\ncancel,1,1,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedType { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_field() {
        let results = commands("type,account,event,coupon\napply,1,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "event",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            read_commands("/nonexistent/commands.csv"),
            Err(CsvError::Open { .. })
        ));
    }

    #[test]
    fn write_coupon_rows() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut waiting = Coupon::waiting(1, 8, at, 1);
        waiting.id = 2;
        let mut issued = Coupon::issued(1, 7, at);
        issued.id = 1;

        let mut out = Vec::new();
        write_coupons(&mut out, [&issued, &waiting]).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "coupon,event,account,status,queue_position,applied_at,issued_at,redeemed_at,no_show_at"
        );
        assert_eq!(
            lines[1],
            "1,1,7,ISSUED,,2025-03-01T09:00:00+00:00,2025-03-01T09:00:00+00:00,,"
        );
        assert_eq!(lines[2], "2,1,8,WAITING,1,2025-03-01T09:00:00+00:00,,,");
    }
}
