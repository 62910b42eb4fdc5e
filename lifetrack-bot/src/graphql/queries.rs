//! GraphQL documents sent to the LifeTrack backend.

pub const LOGIN: &str = r#"
mutation Login($email: String!, $password: String!) {
    login(email: $email, password: $password) {
        token
        user {
            id
            email
            name
        }
    }
}
"#;

pub const ACTIVE_SESSION: &str = r#"
query GetActiveSession {
    activeSession {
        id
        name
        status
        duration
        skill {
            id
            name
        }
    }
}
"#;

pub const SKILLS: &str = r#"
query GetSkills {
    skills {
        id
        name
        level
    }
}
"#;

pub const SKILL: &str = r#"
query GetSkill($id: UUID!) {
    skill(id: $id) {
        id
        name
    }
}
"#;

pub const START_SESSION: &str = r#"
mutation StartSession($skillId: UUID!, $name: String!) {
    startSession(skillId: $skillId, name: $name) {
        id
        name
        status
        startedAt
    }
}
"#;

pub const PAUSE_SESSION: &str = r#"
mutation PauseSession($id: UUID!) {
    pauseSession(id: $id) {
        id
        status
    }
}
"#;

pub const RESUME_SESSION: &str = r#"
mutation ResumeSession($id: UUID!) {
    resumeSession(id: $id) {
        id
        status
    }
}
"#;

pub const STOP_SESSION: &str = r#"
mutation StopSession($id: UUID!) {
    stopSession(id: $id) {
        id
        status
        duration
    }
}
"#;

pub const EVENTS: &str = r#"
query GetEvents($startDate: Date!, $endDate: Date!) {
    events(startDate: $startDate, endDate: $endDate) {
        id
        title
        description
        startTime
        endTime
        type
        allDay
    }
}
"#;

pub const EVENT: &str = r#"
query GetEvent($id: UUID!) {
    event(id: $id) {
        id
        title
        description
        startTime
        endTime
        type
        allDay
        location
        attendees
    }
}
"#;

pub const CREATE_EVENT: &str = r#"
mutation CreateEvent($input: CreateEventInput!) {
    createEvent(input: $input) {
        id
        title
        startTime
        type
    }
}
"#;

pub const DELETE_EVENT: &str = r#"
mutation DeleteEvent($id: UUID!) {
    deleteEvent(id: $id)
}
"#;

pub const NOTES: &str = r#"
query GetNotes($limit: Int!) {
    notes(limit: $limit) {
        nodes {
            id
            title
            content
            tags
            createdAt
        }
    }
}
"#;

pub const NOTE: &str = r#"
query GetNote($id: UUID!) {
    note(id: $id) {
        id
        title
        content
        tags
        createdAt
        updatedAt
    }
}
"#;

pub const CREATE_NOTE: &str = r#"
mutation CreateNote($input: CreateNoteInput!) {
    createNote(input: $input) {
        id
        title
        tags
    }
}
"#;

pub const DELETE_NOTE: &str = r#"
mutation DeleteNote($id: UUID!) {
    deleteNote(id: $id)
}
"#;

pub const SEARCH_NOTES: &str = r#"
query SearchNotes($query: String!) {
    searchNotes(query: $query) {
        id
        title
        content
        tags
    }
}
"#;

pub const ACTIVITY_STATS: &str = r#"
query GetStats($startDate: Date!, $endDate: Date!) {
    activityStats(startDate: $startDate, endDate: $endDate) {
        totalActivities
        totalMinutes
        totalHours
        skillBreakdown {
            skillName
            activityCount
            totalHours
        }
    }
}
"#;

pub const CREATE_FILE: &str = r#"
mutation CreateFile($input: CreateFileInput!) {
    createFile(input: $input) {
        id
        filename
        directory
        originalFilename
        fileSize
        createdAt
    }
}
"#;

pub const DIRECTORY_LISTING: &str = r#"
query Files($filter: FileFilter, $limit: Int, $directory: String!) {
    files(filter: $filter, limit: $limit) {
        nodes {
            id
            filename
            originalFilename
            fileSize
            mimeType
            createdAt
            description
        }
        totalCount
    }
    directory(path: $directory) {
        subdirectories
        fileCount
    }
}
"#;

pub const DOWNLOADABLE_FILES: &str = r#"
query Files($filter: FileFilter, $limit: Int) {
    files(filter: $filter, limit: $limit) {
        nodes {
            id
            originalFilename
            fileSize
        }
    }
}
"#;

pub const FILE: &str = r#"
query File($id: UUID!) {
    file(id: $id) {
        id
        originalFilename
        directory
        mimeType
        fileSize
        telegramFileId
        description
    }
}
"#;

pub const PENDING_NOTIFICATIONS: &str = r#"
query GetPendingNotifications {
    pendingNotifications {
        id
        userId
        eventId
        reminderId
        scheduledTime
        channel
        notificationType
        message
    }
}
"#;

pub const MARK_NOTIFICATION_SENT: &str = r#"
mutation MarkNotificationSent($id: UUID!) {
    markNotificationSent(id: $id) {
        id
        sent
    }
}
"#;

pub const NOTIFICATION_EVENT: &str = r#"
query GetEvent($id: UUID!) {
    event(id: $id) {
        title
        startTime
        endTime
        type
        location
    }
}
"#;

pub const NOTIFICATION_REMINDER: &str = r#"
query GetReminder($id: UUID!) {
    reminder(id: $id) {
        title
        description
        dueTime
        priority
    }
}
"#;

pub const ACTIVE_SESSION_ID: &str = r#"
query GetActiveSession {
    activeSession {
        id
    }
}
"#;

pub const SKILL_NAMES: &str = r#"
query GetSkills {
    skills {
        id
        name
    }
}
"#;

// Follow-ups when a natural-language request resolved to the running session

pub const FOLLOW_UP_STOP_SESSION: &str = r#"
mutation StopSession($id: UUID!) {
    stopSession(id: $id, notes: "Completed") {
        id
        name
        duration
        status
        skill {
            name
        }
    }
}
"#;

pub const FOLLOW_UP_PAUSE_SESSION: &str = r#"
mutation PauseSession($id: UUID!) {
    pauseSession(id: $id) {
        id
        name
        status
        pausedAt
        skill {
            name
        }
    }
}
"#;

pub const FOLLOW_UP_RESUME_SESSION: &str = r#"
mutation ResumeSession($id: UUID!) {
    resumeSession(id: $id) {
        id
        name
        status
        skill {
            name
        }
    }
}
"#;
