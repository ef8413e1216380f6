use actix_cors::Cors;
use actix_web::{get, post, put, web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Client};
use serde::Deserialize;
use std::collections::HashSet;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use splitledger::auth::{check_authorization_level, issue_session_token, AuthorizationLevel};
use splitledger::balance::{
    apply_settlements, compute_balance_with, spending_by_category, NettingStrategy,
};
use splitledger::exchange::plan_exchanges;
use splitledger::money::Money;
use splitledger::schemas::{
    Expense, Group, Participant, Payer, Settlement, SplitPolicy, UserId,
};
use splitledger::split::{compute_split, validate_payers};

const DB_NAME: &str = "SplitLedger";

#[derive(Deserialize)]
struct GroupSubmission {
    name: String,
    currency: String,
    members: Vec<UserId>,
}

#[derive(Deserialize)]
struct ExpenseSubmission {
    title: String,
    amount: Money,
    currency: String,
    date: NaiveDate,
    note: Option<String>,
    payers: Vec<Payer>,
    participants: Vec<UserId>,
    policy: SplitPolicy,
    created_by: UserId,
}

#[derive(Deserialize)]
struct SettlementSubmission {
    from_user: UserId,
    to_user: UserId,
    amount: Money,
    currency: String,
    date: NaiveDate,
    note: Option<String>,
    group_id: Option<String>,
}

#[derive(Deserialize)]
struct SessionRequest {
    user_id: UserId,
}

#[derive(Deserialize)]
struct BalanceQuery {
    strategy: Option<NettingStrategy>,
}

fn authorize(request: &HttpRequest) -> Result<AuthorizationLevel, HttpResponse> {
    check_authorization_level(request)
        .ok_or_else(|| HttpResponse::Unauthorized().body("Missing or invalid authorization"))
}

/// Reads of a user's data are allowed to the service and to that user.
fn authorize_user(request: &HttpRequest, user: &UserId) -> Result<(), HttpResponse> {
    match authorize(request)? {
        AuthorizationLevel::Service => Ok(()),
        AuthorizationLevel::User(requester) if requester == *user => Ok(()),
        AuthorizationLevel::User(_) => {
            Err(HttpResponse::Forbidden().body("You can only view your own data"))
        }
    }
}

#[put("/groups/{id}")]
async fn add_group(
    client: web::Data<Client>,
    id: web::Path<String>,
    json: web::Json<GroupSubmission>,
    request: HttpRequest,
) -> HttpResponse {
    if let Err(response) = authorize(&request) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    let submission = json.into_inner();
    let group = Group {
        id: id.into_inner(),
        name: submission.name,
        currency: submission.currency,
        members: submission.members,
        expenses: vec![],
    };
    match groups.insert_one(&group, None).await {
        Ok(_) => {
            tracing::info!(group = %group.id, "group added");
            HttpResponse::Ok().body("Group added")
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/groups/{id}")]
async fn get_group(
    client: web::Data<Client>,
    id: web::Path<String>,
    request: HttpRequest,
) -> HttpResponse {
    if let Err(response) = authorize(&request) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    match groups.find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(group)) => HttpResponse::Ok().json(group),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired group"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    client: web::Data<Client>,
    id: web::Path<String>,
    json: web::Json<ExpenseSubmission>,
    request: HttpRequest,
) -> HttpResponse {
    let level = match authorize(&request) {
        Ok(level) => level,
        Err(response) => return response,
    };
    let submission = json.into_inner();
    if let AuthorizationLevel::User(user) = &level {
        if *user != submission.created_by {
            return HttpResponse::Forbidden().body("Expenses can only be recorded on your own behalf");
        }
    }

    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    let id = id.into_inner();
    let group = match groups.find_one(doc! { "id": id.as_str() }, None).await {
        Ok(Some(group)) => group,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired group"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };

    if submission.currency != group.currency {
        return HttpResponse::BadRequest()
            .body("Expense currency does not match the group's settlement currency");
    }
    let mut seen = HashSet::new();
    if !submission
        .participants
        .iter()
        .all(|user| seen.insert(user.clone()))
    {
        return HttpResponse::BadRequest().body("Duplicate participants in the expense");
    }
    let outsider = submission
        .participants
        .iter()
        .chain(submission.payers.iter().map(|payer| &payer.user_id))
        .any(|user| !group.members.contains(user));
    if outsider {
        return HttpResponse::BadRequest().body("All payers and participants must be group members");
    }

    if let Err(err) = validate_payers(submission.amount, &submission.payers) {
        return HttpResponse::UnprocessableEntity().json(err);
    }
    let shares = match compute_split(submission.amount, &submission.participants, &submission.policy)
    {
        Ok(shares) => shares,
        Err(err) => return HttpResponse::UnprocessableEntity().json(err),
    };

    let expense = Expense {
        id: bson::oid::ObjectId::new().to_hex(),
        title: submission.title,
        amount: submission.amount,
        currency: submission.currency,
        date: submission.date,
        note: submission.note,
        payers: submission.payers,
        participants: submission
            .participants
            .iter()
            .map(|user_id| Participant {
                user_id: user_id.clone(),
                share: shares[user_id],
            })
            .collect(),
        group_id: Some(id.clone()),
        created_by: submission.created_by,
        created_at: Utc::now(),
    };
    let expense_bson = match bson::to_bson(&expense) {
        Ok(value) => value,
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    match groups
        .update_one(
            doc! { "id": id.as_str() },
            doc! { "$push": { "expenses": expense_bson } },
            None,
        )
        .await
    {
        Ok(_) => {
            tracing::info!(group = %id, expense = %expense.id, "expense recorded");
            HttpResponse::Ok().json(expense)
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/groups/{id}/balances/{user}")]
async fn get_group_balance(
    client: web::Data<Client>,
    path: web::Path<(String, String)>,
    query: web::Query<BalanceQuery>,
    request: HttpRequest,
) -> HttpResponse {
    let (id, user) = path.into_inner();
    if let Err(response) = authorize_user(&request, &user) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    let group = match groups.find_one(doc! { "id": id.as_str() }, None).await {
        Ok(Some(group)) => group,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired group"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let strategy = query.strategy.unwrap_or_default();
    let balance = compute_balance_with(&user, &group.expenses, strategy);

    let settlements = client
        .database(DB_NAME)
        .collection::<Settlement>("Settlements");
    let group_settlements: Vec<Settlement> = match settlements
        .find(doc! { "group_id": id.as_str() }, None)
        .await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(found) => found,
            Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
        },
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    HttpResponse::Ok().json(apply_settlements(balance, &user, &group_settlements))
}

#[get("/users/{user}/balance")]
async fn get_user_balance(
    client: web::Data<Client>,
    user: web::Path<String>,
    query: web::Query<BalanceQuery>,
    request: HttpRequest,
) -> HttpResponse {
    let user = user.into_inner();
    if let Err(response) = authorize_user(&request, &user) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    let member_groups: Vec<Group> = match groups.find(doc! { "members": user.as_str() }, None).await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(found) => found,
            Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
        },
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let expenses: Vec<Expense> = member_groups
        .into_iter()
        .flat_map(|group| group.expenses)
        .collect();
    let strategy = query.strategy.unwrap_or_default();
    let balance = compute_balance_with(&user, &expenses, strategy);

    let settlements = client
        .database(DB_NAME)
        .collection::<Settlement>("Settlements");
    let filter = doc! { "$or": [{ "from_user": user.as_str() }, { "to_user": user.as_str() }] };
    let user_settlements: Vec<Settlement> = match settlements.find(filter, None).await {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(found) => found,
            Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
        },
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    HttpResponse::Ok().json(apply_settlements(balance, &user, &user_settlements))
}

#[get("/groups/{id}/suggestions")]
async fn get_settle_suggestions(
    client: web::Data<Client>,
    id: web::Path<String>,
    request: HttpRequest,
) -> HttpResponse {
    if let Err(response) = authorize(&request) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    match groups.find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(group)) => HttpResponse::Ok().json(plan_exchanges(&group)),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired group"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[post("/settlements")]
async fn add_settlement(
    client: web::Data<Client>,
    json: web::Json<SettlementSubmission>,
    request: HttpRequest,
) -> HttpResponse {
    let level = match authorize(&request) {
        Ok(level) => level,
        Err(response) => return response,
    };
    let submission = json.into_inner();
    if let AuthorizationLevel::User(user) = &level {
        if *user != submission.from_user && *user != submission.to_user {
            return HttpResponse::Forbidden()
                .body("Settlements can only be recorded by one of the involved parties");
        }
    }
    if submission.amount <= Money::ZERO {
        return HttpResponse::UnprocessableEntity().body("Settlement amount must be positive");
    }
    if submission.from_user == submission.to_user {
        return HttpResponse::UnprocessableEntity()
            .body("A settlement needs two distinct parties");
    }

    let settlement = Settlement {
        id: bson::oid::ObjectId::new().to_hex(),
        from_user: submission.from_user,
        to_user: submission.to_user,
        amount: submission.amount,
        currency: submission.currency,
        date: submission.date,
        note: submission.note,
        group_id: submission.group_id,
    };
    let settlements = client
        .database(DB_NAME)
        .collection::<Settlement>("Settlements");
    match settlements.insert_one(&settlement, None).await {
        Ok(_) => {
            tracing::info!(settlement = %settlement.id, "settlement recorded");
            HttpResponse::Ok().json(settlement)
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/users/{user}/settlements")]
async fn get_user_settlements(
    client: web::Data<Client>,
    user: web::Path<String>,
    request: HttpRequest,
) -> HttpResponse {
    let user = user.into_inner();
    if let Err(response) = authorize_user(&request, &user) {
        return response;
    }
    let settlements = client
        .database(DB_NAME)
        .collection::<Settlement>("Settlements");
    let filter = doc! { "$or": [{ "from_user": user.as_str() }, { "to_user": user.as_str() }] };
    let options = FindOptions::builder().sort(doc! { "date": -1 }).build();
    match settlements.find(filter, options).await {
        Ok(cursor) => match cursor.try_collect::<Vec<Settlement>>().await {
            Ok(found) => HttpResponse::Ok().json(found),
            Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
        },
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/users/{user}/spending")]
async fn get_user_spending(
    client: web::Data<Client>,
    user: web::Path<String>,
    request: HttpRequest,
) -> HttpResponse {
    let user = user.into_inner();
    if let Err(response) = authorize_user(&request, &user) {
        return response;
    }
    let groups = client.database(DB_NAME).collection::<Group>("Groups");
    let member_groups: Vec<Group> = match groups.find(doc! { "members": user.as_str() }, None).await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(found) => found,
            Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
        },
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let expenses: Vec<Expense> = member_groups
        .into_iter()
        .flat_map(|group| group.expenses)
        .collect();
    HttpResponse::Ok().json(spending_by_category(&user, &expenses))
}

#[post("/sessions")]
async fn create_session(json: web::Json<SessionRequest>, request: HttpRequest) -> HttpResponse {
    match authorize(&request) {
        Ok(AuthorizationLevel::Service) => {}
        Ok(AuthorizationLevel::User(_)) => {
            return HttpResponse::Forbidden().body("Only the service may issue sessions")
        }
        Err(response) => return response,
    }
    let Ok(api_token) = std::env::var("API_TOKEN") else {
        return HttpResponse::InternalServerError().body("API_TOKEN is not configured");
    };
    let token = issue_session_token(&json.user_id, Utc::now().timestamp(), &api_token);
    HttpResponse::Ok().json(token)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_tracing();
    let uri = std::env::var("MONGODB_URI").expect("You need to add the MONGODB_URI to the env");
    std::env::var("API_TOKEN").expect("You need to add the API_TOKEN to the env");

    let client = Client::with_uri_str(&uri).await.expect("failed to connect");
    tracing::info!("connected to MongoDB");

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(client.clone()))
            .service(add_group)
            .service(get_group)
            .service(add_expense)
            .service(get_group_balance)
            .service(get_user_balance)
            .service(get_settle_suggestions)
            .service(add_settlement)
            .service(get_user_settlements)
            .service(get_user_spending)
            .service(create_session)
    })
    .bind(bind_addr)?
    .run()
    .await
}
