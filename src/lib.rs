pub mod app;
pub mod config;
pub mod error;
pub mod api {
    pub mod auth;
    pub mod bootcamps;
    pub mod courses;
    pub mod errors;
    pub mod extract;
    pub mod response;
    pub mod reviews;
    pub mod upload;
    pub mod users;
}
pub mod auth {
    pub mod middleware;
    pub mod models;
    pub mod password;
    pub mod policy;
    pub mod tokens;
}
pub mod db {
    pub mod bootcamp_repository;
    pub mod course_repository;
    pub mod json;
    pub mod models;
    pub mod query;
    pub mod review_repository;
    pub mod user_repository;
}
pub mod geocoder {
    pub mod client;
}
pub mod mail {
    pub mod client;
}
pub mod services {
    pub mod cascade;
    pub mod geo;
    pub mod rollup;
    pub mod seed;
    pub mod slug;
}
pub mod storage {
    pub mod client;
}
