// @generated manually; mirrors the migrations embedded in `store::run_migrations`.

diesel::table! {
    images (id) {
        id -> Integer,
        source_ref -> Text,
        thumbnail_ref -> Nullable<Text>,
        uploaded_at -> Text,
        taken_at -> Nullable<Text>,
        gps_lat -> Nullable<Double>,
        gps_lon -> Nullable<Double>,
        location_name -> Nullable<Text>,
        embedding -> Binary,
        metadata -> Text,
    }
}

diesel::table! {
    faces (id) {
        id -> Integer,
        image_id -> Integer,
        bbox -> Text,
        encoding -> Nullable<Binary>,
        person_name -> Nullable<Text>,
        confidence -> Double,
    }
}

diesel::table! {
    search_history (id) {
        id -> Integer,
        query -> Text,
        results -> Text,
        ts -> Text,
    }
}

diesel::joinable!(faces -> images (image_id));

diesel::allow_tables_to_appear_in_same_query!(images, faces, search_history,);
