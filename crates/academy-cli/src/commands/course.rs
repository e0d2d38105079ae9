use super::{
    colorize_state, json_pretty, print_course, resolve_course, CommandError, EXIT_FAILURE,
    EXIT_SUCCESS,
};
use crate::CourseCommand;
use academy_core::{Academy, CourseAction, CourseUpdate, NewCourse};
use academy_schema::{CategoryId, FilterOp, PersonId};
use academy_store::CourseRecord;

pub fn run(academy: &Academy, cmd: &CourseCommand, json: bool) -> Result<u8, CommandError> {
    match cmd {
        CourseCommand::Create {
            code,
            name,
            description,
            category,
            instructor,
            hours,
            start,
            end,
            max_students,
        } => {
            let course = academy.create_course(NewCourse {
                code: code.clone(),
                name: name.clone(),
                description: description.clone(),
                category: category.as_deref().map(CategoryId::new),
                instructor: instructor.as_deref().map(PersonId::new),
                duration_hours: *hours,
                start_date: *start,
                end_date: *end,
                max_students: *max_students,
            })?;
            show(&course, json, "created")
        }
        CourseCommand::Update {
            course,
            code,
            name,
            description,
            category,
            instructor,
            hours,
            start,
            end,
            max_students,
            clear,
        } => {
            let current = resolve_course(academy, course)?;
            let mut update = CourseUpdate {
                code: code.clone(),
                name: name.clone(),
                description: description.clone().map(Some),
                category: category.as_deref().map(|c| Some(CategoryId::new(c))),
                instructor: instructor.as_deref().map(|p| Some(PersonId::new(p))),
                duration_hours: hours.map(Some),
                start_date: start.map(Some),
                end_date: end.map(Some),
                max_students: *max_students,
            };
            for field in clear {
                match field.as_str() {
                    "description" => update.description = Some(None),
                    "category" => update.category = Some(None),
                    "instructor" => update.instructor = Some(None),
                    "hours" => update.duration_hours = Some(None),
                    "start" => update.start_date = Some(None),
                    "end" => update.end_date = Some(None),
                    other => {
                        return Err(CommandError::validation(format!(
                            "cannot clear '{other}': expected description, category, instructor, hours, start, or end"
                        )))
                    }
                }
            }
            let updated = academy.update_course(&current.course_id, update)?;
            show(&updated, json, "updated")
        }
        CourseCommand::Publish { courses } => {
            transition(academy, courses, CourseAction::Publish, json)
        }
        CourseCommand::Start { courses } => {
            transition(academy, courses, CourseAction::Start, json)
        }
        CourseCommand::Complete { courses } => {
            transition(academy, courses, CourseAction::Complete, json)
        }
        CourseCommand::Cancel { courses } => {
            transition(academy, courses, CourseAction::Cancel, json)
        }
        CourseCommand::Reset { courses } => {
            transition(academy, courses, CourseAction::ResetToDraft, json)
        }
        CourseCommand::Show { course } => {
            let course = resolve_course(academy, course)?;
            if json {
                println!("{}", json_pretty(&course)?);
            } else {
                print_course(&course);
            }
            Ok(EXIT_SUCCESS)
        }
        CourseCommand::List {
            category,
            instructor,
        } => {
            let courses = match (category, instructor) {
                (Some(category), Some(instructor)) => {
                    let mut courses = academy.courses_in_category(category)?;
                    courses.retain(|c| c.instructor.as_ref().is_some_and(|p| p == instructor));
                    courses
                }
                (Some(category), None) => academy.courses_in_category(category)?,
                (None, Some(instructor)) => academy.courses_taught_by(instructor)?,
                (None, None) => academy.list_courses()?,
            };
            list(&courses, json)
        }
        CourseCommand::Full { op, value } => {
            let op = FilterOp::parse(op).ok_or_else(|| {
                CommandError::validation(format!("unsupported operator '{op}': use = or !="))
            })?;
            let ids = academy.search_is_full(op, *value)?;
            let mut courses = Vec::with_capacity(ids.len());
            for id in &ids {
                courses.push(academy.get_course(id)?);
            }
            courses.sort_by(|a, b| a.code.cmp(&b.code));
            list(&courses, json)
        }
    }
}

fn show(course: &CourseRecord, json: bool, verb: &str) -> Result<u8, CommandError> {
    if json {
        println!("{}", json_pretty(course)?);
    } else {
        println!("{verb} course {} ({})", course.code, course.course_id);
    }
    Ok(EXIT_SUCCESS)
}

fn list(courses: &[CourseRecord], json: bool) -> Result<u8, CommandError> {
    if json {
        println!("{}", json_pretty(&courses)?);
    } else if courses.is_empty() {
        println!("no courses found");
    } else {
        println!(
            "{:<12} {:<24} {:<12} {:>9}  COURSE_ID",
            "CODE", "NAME", "STATE", "SEATS"
        );
        for c in courses {
            let seats = format!("{}/{}", c.enrolled_count(), c.max_students);
            println!(
                "{:<12} {:<24} {:<12} {:>9}  {}",
                c.code,
                c.name,
                colorize_state(&c.state.to_string()),
                seats,
                c.course_id
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn transition(
    academy: &Academy,
    inputs: &[String],
    action: CourseAction,
    json: bool,
) -> Result<u8, CommandError> {
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        ids.push(resolve_course(academy, input)?.course_id);
    }
    let outcomes = academy.apply_course_action(&ids, action);

    // a single course reports its error the way every other command does
    if let [only] = outcomes.as_slice() {
        if let Err(e) = &only.result {
            return Err(CommandError {
                message: e.to_string(),
                code: super::exit_code_for(e.kind()),
            });
        }
    }

    if json {
        let payload: Vec<_> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(state) => serde_json::json!({
                    "course_id": o.course_id,
                    "ok": true,
                    "state": state,
                }),
                Err(e) => serde_json::json!({
                    "course_id": o.course_id,
                    "ok": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        for outcome in &outcomes {
            match &outcome.result {
                Ok(state) => println!(
                    "{action} {}: {}",
                    outcome.course_id,
                    colorize_state(&state.to_string())
                ),
                Err(e) => eprintln!("{action} {}: {e}", outcome.course_id),
            }
        }
    }

    if outcomes.iter().all(|o| o.is_ok()) {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
