//! Test modules for the scanner system

mod controller;
