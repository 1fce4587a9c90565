use axum::{extract::State, response::Response};
use minijinja::context;

use crate::proxy::server::AppState;
use crate::proxy::upstream::resources::{self, Class};
use crate::proxy::views::{fields_of, Page, TableRow};

/// Instructor dashboard: own profile plus the classes assigned to them
pub async fn dashboard(State(state): State<AppState>, page: Page) -> Response {
    let Some(session) = page.session.as_ref() else {
        return state.views.render(&page, "instructor_dashboard.html", context! {});
    };
    let token = page.token();

    let profile = match resources::profile(&state.upstream, token).await {
        Ok(profile) => profile,
        Err(e) => return state.views.upstream_failure(&state, &page, "Profile", e).await,
    };

    let classes = match resources::list_classes(&state.upstream, token).await {
        Ok(classes) => classes,
        Err(e) => return state.views.upstream_failure(&state, &page, "Classes", e).await,
    };

    let rows: Vec<TableRow> = classes
        .iter()
        .filter(|c| c.taught_by(&session.subject_id))
        .map(own_class_row)
        .collect();

    state.views.render(
        &page,
        "instructor_dashboard.html",
        context! {
            profile => fields_of(&profile),
            columns => ["Name", "Code", "Room"],
            rows => rows,
        },
    )
}

fn own_class_row(class: &Class) -> TableRow {
    let room = class
        .extra
        .get("room")
        .map(crate::proxy::views::display_value)
        .or_else(|| class.room_id.clone())
        .unwrap_or_default();

    TableRow {
        id: None,
        cells: vec![
            class.name.clone().unwrap_or_default(),
            class.code.clone().unwrap_or_default(),
            room,
        ],
        href: None,
    }
}
