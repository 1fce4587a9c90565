// Admin area pages: dashboard, resource lists and detail views
use axum::{
    extract::{Path, State},
    response::Response,
};
use minijinja::context;
use serde::Serialize;

use crate::proxy::server::AppState;
use crate::proxy::upstream::resources::{self, Class, Department, Instructor, Room};
use crate::proxy::views::{fields_of, Page, TableRow};

#[derive(Debug, Serialize)]
struct Tile {
    label: &'static str,
    href: &'static str,
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CreateField {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
}

const fn field(name: &'static str, label: &'static str, kind: &'static str) -> CreateField {
    CreateField { name, label, kind }
}

const ROOM_FIELDS: &[CreateField] = &[
    field("name", "Name", "text"),
    field("building", "Building", "text"),
    field("capacity", "Capacity", "number"),
];

const CLASS_FIELDS: &[CreateField] = &[
    field("name", "Name", "text"),
    field("code", "Code", "text"),
    field("instructorId", "Instructor id", "text"),
    field("roomId", "Room id", "text"),
];

const DEPARTMENT_FIELDS: &[CreateField] = &[
    field("name", "Name", "text"),
    field("code", "Code", "text"),
];

const INSTRUCTOR_FIELDS: &[CreateField] = &[
    field("firstName", "First name", "text"),
    field("lastName", "Last name", "text"),
    field("email", "Email", "email"),
];

const TILES: &[(&str, &str)] = &[
    ("Rooms", "/admin/rooms"),
    ("Classes", "/admin/classes"),
    ("Departments", "/admin/departments"),
    ("Instructors", "/admin/instructors"),
];

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Admin dashboard: one tile per resource with its current count.
/// A failed count shows as unknown instead of failing the page.
pub async fn dashboard(State(state): State<AppState>, page: Page) -> Response {
    let token = page.token();
    let up = &state.upstream;

    let rooms = resources::list_rooms(up, token).await.map(|v| v.len());
    let classes = resources::list_classes(up, token).await.map(|v| v.len());
    let departments = resources::list_departments(up, token).await.map(|v| v.len());
    let instructors = resources::list_instructors(up, token).await.map(|v| v.len());

    let mut counts = Vec::with_capacity(TILES.len());
    for result in [rooms, classes, departments, instructors] {
        match result {
            Err(e) if e.is_unauthorized() => {
                return state.views.upstream_failure(&state, &page, "Dashboard", e).await;
            }
            other => counts.push(other.ok()),
        }
    }

    let tiles: Vec<Tile> = TILES
        .iter()
        .zip(counts)
        .map(|(&(label, href), count)| Tile { label, href, count })
        .collect();

    state
        .views
        .render(&page, "admin_dashboard.html", context! { tiles => tiles })
}

pub async fn rooms(State(state): State<AppState>, page: Page) -> Response {
    match resources::list_rooms(&state.upstream, page.token()).await {
        Ok(rooms) => {
            let rows: Vec<TableRow> = rooms.iter().map(room_row).collect();
            state.views.render(
                &page,
                "table.html",
                context! {
                    title => "Rooms",
                    resource => "room",
                    resource_label => "room",
                    create_fields => ROOM_FIELDS,
                    columns => ["Name", "Building", "Capacity"],
                    rows => rows,
                },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Rooms", e).await,
    }
}

fn room_row(room: &Room) -> TableRow {
    TableRow {
        id: Some(room.id.clone()),
        cells: vec![
            text(&room.name),
            text(&room.building),
            room.capacity.map(|c| c.to_string()).unwrap_or_default(),
        ],
        href: Some(format!("/admin/rooms/{}", room.id)),
    }
}

pub async fn room_detail(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Response {
    match resources::get_room(&state.upstream, page.token(), &id).await {
        Ok(room) => {
            let title = room.name.clone().unwrap_or_else(|| format!("Room {}", room.id));
            state.views.render(
                &page,
                "detail.html",
                context! { back => "/admin/rooms", title => title, fields => fields_of(&room) },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Room", e).await,
    }
}

pub async fn classes(State(state): State<AppState>, page: Page) -> Response {
    match resources::list_classes(&state.upstream, page.token()).await {
        Ok(classes) => {
            let rows: Vec<TableRow> = classes.iter().map(class_row).collect();
            state.views.render(
                &page,
                "table.html",
                context! {
                    title => "Classes",
                    resource => "class",
                    resource_label => "class",
                    create_fields => CLASS_FIELDS,
                    columns => ["Name", "Code", "Instructor", "Room"],
                    rows => rows,
                },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Classes", e).await,
    }
}

pub(crate) fn class_row(class: &Class) -> TableRow {
    let nested_name = |key: &str| {
        class
            .extra
            .get(key)
            .map(crate::proxy::views::display_value)
            .filter(|s| !s.is_empty())
    };

    TableRow {
        id: Some(class.id.clone()),
        cells: vec![
            text(&class.name),
            text(&class.code),
            nested_name("instructor").unwrap_or_else(|| text(&class.instructor_id)),
            nested_name("room").unwrap_or_else(|| text(&class.room_id)),
        ],
        href: Some(format!("/admin/classes/{}", class.id)),
    }
}

pub async fn class_detail(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Response {
    match resources::get_class(&state.upstream, page.token(), &id).await {
        Ok(class) => {
            let title = class.name.clone().unwrap_or_else(|| format!("Class {}", class.id));
            state.views.render(
                &page,
                "detail.html",
                context! { back => "/admin/classes", title => title, fields => fields_of(&class) },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Class", e).await,
    }
}

pub async fn departments(State(state): State<AppState>, page: Page) -> Response {
    match resources::list_departments(&state.upstream, page.token()).await {
        Ok(departments) => {
            let rows: Vec<TableRow> = departments.iter().map(department_row).collect();
            state.views.render(
                &page,
                "table.html",
                context! {
                    title => "Departments",
                    resource => "department",
                    resource_label => "department",
                    create_fields => DEPARTMENT_FIELDS,
                    columns => ["Name", "Code"],
                    rows => rows,
                },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Departments", e).await,
    }
}

fn department_row(department: &Department) -> TableRow {
    TableRow {
        id: Some(department.id.clone()),
        cells: vec![text(&department.name), text(&department.code)],
        href: None,
    }
}

pub async fn instructors(State(state): State<AppState>, page: Page) -> Response {
    match resources::list_instructors(&state.upstream, page.token()).await {
        Ok(instructors) => {
            let rows: Vec<TableRow> = instructors.iter().map(instructor_row).collect();
            state.views.render(
                &page,
                "table.html",
                context! {
                    title => "Instructors",
                    resource => "instructors",
                    resource_label => "instructor",
                    create_fields => INSTRUCTOR_FIELDS,
                    columns => ["Name", "Email", "Department"],
                    rows => rows,
                },
            )
        }
        Err(e) => state.views.upstream_failure(&state, &page, "Instructors", e).await,
    }
}

fn instructor_row(instructor: &Instructor) -> TableRow {
    TableRow {
        id: Some(instructor.id.clone()),
        cells: vec![
            instructor.display_name(),
            text(&instructor.email),
            instructor.department_name().unwrap_or_default(),
        ],
        href: Some(format!("/admin/instructors/{}", instructor.id)),
    }
}

pub async fn instructor_detail(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Response {
    match resources::get_instructor(&state.upstream, page.token(), &id).await {
        Ok(instructor) => state.views.render(
            &page,
            "detail.html",
            context! {
                back => "/admin/instructors",
                title => instructor.display_name(),
                fields => fields_of(&instructor),
            },
        ),
        Err(e) => state.views.upstream_failure(&state, &page, "Instructor", e).await,
    }
}
