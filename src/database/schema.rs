/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Diesel schema for the SQLite backend.
//!
//! UUIDs are stored as BLOB, timestamps as RFC3339 TEXT, and booleans as
//! INTEGER (0/1). Conversions to and from domain types happen at the DAL
//! boundary.

diesel::table! {
    tasks (id) {
        id -> Binary,
        user_id -> Text,
        title -> Text,
        description -> Text,
        priority -> Text,
        completed -> Integer,
        due_at -> Nullable<Text>,
        reminder_offset_minutes -> Nullable<Integer>,
        recurrence_id -> Nullable<Binary>,
        parent_task_id -> Nullable<Binary>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    reminders (id) {
        id -> Binary,
        task_id -> Binary,
        user_id -> Text,
        scheduled_for -> Text,
        status -> Text,
        attempt -> Integer,
        delivery_channel -> Text,
        claimed_at -> Nullable<Text>,
        last_attempt_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    recurrence_patterns (id) {
        id -> Binary,
        user_id -> Text,
        kind -> Text,
        recur_interval -> Integer,
        days_of_week -> Nullable<Text>,
        day_of_month -> Nullable<Integer>,
        month_of_year -> Nullable<Integer>,
        end_date -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    activity_log (id) {
        id -> Binary,
        user_id -> Text,
        event_type -> Text,
        entity_type -> Text,
        entity_id -> Binary,
        occurred_at -> Text,
        details -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(reminders -> tasks (task_id));
diesel::joinable!(tasks -> recurrence_patterns (recurrence_id));

diesel::allow_tables_to_appear_in_same_query!(tasks, reminders, recurrence_patterns, activity_log);
