// ABOUTME: SeaORM entities module for the dossier database models and relationships
// ABOUTME: Exports users, projects, memberships, stages, slots, files and request entities

pub mod categorized_file;
pub mod deliverable_file;
pub mod deliverable_slot;
pub mod delete_request;
pub mod membership;
pub mod project;
pub mod registration_request;
pub mod stage;
pub mod user;
